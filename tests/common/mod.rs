//! Banking fixtures shared by the integration tests
//!
//! Entities, in-memory repositories routed through `#[traced_repository]`,
//! small services built on `SpanRecorder::traced`, and a backend whose
//! span operations always fail.

#![allow(dead_code)]

use async_trait::async_trait;
use bizctx::context::Projection;
use bizctx::telemetry::backend::{BackendError, BackendSpan, SpanContext, TracingBackend};
use bizctx::telemetry::{SpanKind, SpanStatus};
use bizctx::{
    traced_repository, BusinessContext, BusinessFailure, ErrorCategory, Intercepted,
    PersistenceAspect, SpanRecorder, Traceable,
};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: String,
    pub email: String,
    pub phone: String,
    pub segment: String,
}

impl Traceable for Customer {
    fn describe(&self, ctx: BusinessContext) -> BusinessContext {
        ctx.customer_id(self.id.as_str())
            .customer_email(&self.email)
            .customer_phone(&self.phone)
            .customer_segment(self.segment.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub number: String,
    pub customer_id: String,
    pub account_type: String,
    pub branch: String,
}

impl Traceable for Account {
    fn describe(&self, ctx: BusinessContext) -> BusinessContext {
        ctx.account_number(self.number.as_str())
            .account_type(self.account_type.as_str())
            .branch(self.branch.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub number: String,
    pub customer_id: String,
    pub card_type: String,
    pub status: String,
    pub limit: f64,
    pub available: f64,
}

impl Traceable for Card {
    fn describe(&self, ctx: BusinessContext) -> BusinessContext {
        ctx.card_number(&self.number)
            .card_type(self.card_type.as_str())
            .card_status(self.status.as_str())
            .card_limit(self.limit)
            .card_available_amount(self.available)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Loan {
    pub number: String,
    pub customer_id: String,
    pub loan_type: String,
    pub amount: f64,
    pub outstanding: f64,
    pub status: String,
}

impl Traceable for Loan {
    fn describe(&self, ctx: BusinessContext) -> BusinessContext {
        ctx.loan_number(self.number.as_str())
            .loan_type(self.loan_type.as_str())
            .loan_amount(self.amount)
            .loan_outstanding(self.outstanding)
            .loan_status(self.status.as_str())
    }
}

pub fn card(number: &str, customer_id: &str) -> Card {
    Card {
        number: number.to_string(),
        customer_id: customer_id.to_string(),
        card_type: "DEBIT".to_string(),
        status: "ACTIVE".to_string(),
        limit: 5000.0,
        available: 4200.5,
    }
}

pub fn loan(number: &str, customer_id: &str) -> Loan {
    Loan {
        number: number.to_string(),
        customer_id: customer_id.to_string(),
        loan_type: "MORTGAGE".to_string(),
        amount: 250_000.0,
        outstanding: 180_000.0,
        status: "ACTIVE".to_string(),
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("storage unavailable: {0}")]
    Storage(String),
}

impl BusinessFailure for RepositoryError {
    fn error_code(&self) -> Cow<'_, str> {
        match self {
            Self::NotFound { entity, .. } => {
                Cow::Owned(format!("{}_NOT_FOUND", entity.to_uppercase()))
            }
            Self::Duplicate(_) => Cow::Borrowed("DUPLICATE_ENTITY"),
            Self::Storage(_) => Cow::Borrowed("STORAGE_UNAVAILABLE"),
        }
    }

    fn error_category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Duplicate(_) => ErrorCategory::Conflict,
            Self::Storage(_) => ErrorCategory::Persistence,
        }
    }
}

// ============================================================================
// Repositories
// ============================================================================

pub struct CardRepository {
    aspect: PersistenceAspect,
    cards: Mutex<HashMap<String, Card>>,
}

impl Intercepted for CardRepository {
    fn aspect(&self) -> &PersistenceAspect {
        &self.aspect
    }
}

#[traced_repository(entity = "Card")]
impl CardRepository {
    pub fn new(recorder: &SpanRecorder) -> Self {
        Self {
            aspect: PersistenceAspect::new(recorder.clone()),
            cards: Mutex::new(HashMap::new()),
        }
    }

    pub fn save(&self, card: Card) -> Result<Card, RepositoryError> {
        let mut cards = self.cards.lock().unwrap_or_else(PoisonError::into_inner);
        cards.insert(card.number.clone(), card.clone());
        Ok(card)
    }

    pub fn find_by_number(&self, number: &str) -> Result<Option<Card>, RepositoryError> {
        let cards = self.cards.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(cards.get(number).cloned())
    }

    pub fn find_by_customer_id(&self, customer_id: &str) -> Result<Vec<Card>, RepositoryError> {
        let cards = self.cards.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(cards
            .values()
            .filter(|c| c.customer_id == customer_id)
            .cloned()
            .collect())
    }

    pub fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.cards.lock().unwrap_or_else(PoisonError::into_inner).len())
    }

    pub fn delete_by_number(&self, number: &str) -> Result<(), RepositoryError> {
        let mut cards = self.cards.lock().unwrap_or_else(PoisonError::into_inner);
        match cards.remove(number) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::NotFound {
                entity: "Card",
                id: number.to_string(),
            }),
        }
    }

    pub fn block_all_for_customer(&self, customer_id: &str) -> Result<usize, RepositoryError> {
        let mut cards = self.cards.lock().unwrap_or_else(PoisonError::into_inner);
        let mut blocked = 0;
        for card in cards.values_mut().filter(|c| c.customer_id == customer_id) {
            card.status = "BLOCKED".to_string();
            blocked += 1;
        }
        Ok(blocked)
    }

    #[untraced]
    pub fn snapshot(&self) -> Result<Vec<Card>, RepositoryError> {
        let cards = self.cards.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(cards.values().cloned().collect())
    }
}

pub struct LoanRepository {
    aspect: PersistenceAspect,
    loans: tokio::sync::RwLock<HashMap<String, Loan>>,
    unavailable: bool,
}

impl Intercepted for LoanRepository {
    fn aspect(&self) -> &PersistenceAspect {
        &self.aspect
    }
}

#[traced_repository(entity = "Loan")]
impl LoanRepository {
    pub fn new(recorder: &SpanRecorder) -> Self {
        Self {
            aspect: PersistenceAspect::new(recorder.clone()),
            loans: tokio::sync::RwLock::new(HashMap::new()),
            unavailable: false,
        }
    }

    /// Repository whose every call fails with a storage error
    pub fn unavailable(recorder: &SpanRecorder) -> Self {
        Self {
            unavailable: true,
            ..Self::new(recorder)
        }
    }

    #[untraced]
    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable {
            return Err(RepositoryError::Storage("connection refused".to_string()));
        }
        Ok(())
    }

    pub async fn save(&self, loan: Loan) -> Result<Loan, RepositoryError> {
        self.check_available()?;
        let mut loans = self.loans.write().await;
        if loans.contains_key(&loan.number) {
            return Err(RepositoryError::Duplicate(loan.number.clone()));
        }
        loans.insert(loan.number.clone(), loan.clone());
        Ok(loan)
    }

    pub async fn find_by_number(&self, number: &str) -> Result<Option<Loan>, RepositoryError> {
        self.check_available()?;
        Ok(self.loans.read().await.get(number).cloned())
    }

    pub async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Vec<Loan>, RepositoryError> {
        self.check_available()?;
        Ok(self
            .loans
            .read()
            .await
            .values()
            .filter(|l| l.customer_id == customer_id)
            .cloned()
            .collect())
    }

    pub async fn exists_by_number(&self, number: &str) -> Result<bool, RepositoryError> {
        self.check_available()?;
        Ok(self.loans.read().await.contains_key(number))
    }
}

// ============================================================================
// Services
// ============================================================================

pub struct CardService {
    recorder: SpanRecorder,
    repository: CardRepository,
}

impl CardService {
    pub fn new(recorder: &SpanRecorder) -> Self {
        Self {
            recorder: recorder.clone(),
            repository: CardRepository::new(recorder),
        }
    }

    pub fn repository(&self) -> &CardRepository {
        &self.repository
    }

    pub fn issue_card(&self, card: Card) -> Result<Card, RepositoryError> {
        let context = BusinessContext::new()
            .operation_type("write")
            .customer_id(card.customer_id.as_str())
            .card_type(card.card_type.as_str());

        self.recorder
            .traced("CardService.issueCard", context)
            .on_success(|issued: &Card, ctx| ctx.describe(issued))
            .run(|| self.repository.save(card))
    }

    pub fn get_card(&self, number: &str) -> Result<Card, RepositoryError> {
        self.recorder
            .traced(
                "CardService.getCard",
                BusinessContext::new().operation_type("read").card_number(number),
            )
            .on_success(|found: &Card, ctx| ctx.card_status(found.status.as_str()))
            .run(|| {
                self.repository.find_by_number(number).and_then(|found| {
                    found.ok_or_else(|| RepositoryError::NotFound {
                        entity: "Card",
                        id: number.to_string(),
                    })
                })
            })
    }

    pub fn cards_for_customer(&self, customer_id: &str) -> Result<Vec<Card>, RepositoryError> {
        self.recorder
            .traced(
                "CardService.getCardsByCustomer",
                BusinessContext::new().customer_id(customer_id),
            )
            .on_success(|cards: &Vec<Card>, ctx| ctx.result_count(cards.len()))
            .run(|| self.repository.find_by_customer_id(customer_id))
    }
}

pub struct LoanService {
    recorder: SpanRecorder,
    repository: LoanRepository,
}

impl LoanService {
    pub fn new(recorder: &SpanRecorder, repository: LoanRepository) -> Self {
        Self {
            recorder: recorder.clone(),
            repository,
        }
    }

    pub async fn open_loan(&self, loan: Loan) -> Result<Loan, RepositoryError> {
        let context = BusinessContext::new()
            .operation_type("write")
            .customer_id(loan.customer_id.as_str())
            .loan_type(loan.loan_type.as_str())
            .loan_amount(loan.amount);

        self.recorder
            .traced("LoanService.openLoan", context)
            .on_success(|opened: &Loan, ctx| ctx.loan_number(opened.number.as_str()))
            .run_async(self.repository.save(loan))
            .await
    }

    pub async fn loans_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<Loan>, RepositoryError> {
        self.recorder
            .traced(
                "LoanService.getLoansByCustomer",
                BusinessContext::new().customer_id(customer_id),
            )
            .on_success(|loans: &Vec<Loan>, ctx| ctx.result_count(loans.len()))
            .run_async(self.repository.find_by_customer_id(customer_id))
            .await
    }
}

// ============================================================================
// Backends
// ============================================================================

/// Backend that opens spans but fails every operation on them
#[derive(Debug, Default)]
pub struct FlakyBackend {
    pub started: AtomicUsize,
    pub end_calls: Arc<AtomicUsize>,
}

impl FlakyBackend {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn end_calls(&self) -> usize {
        self.end_calls.load(Ordering::SeqCst)
    }
}

struct FlakySpan {
    context: SpanContext,
    end_calls: Arc<AtomicUsize>,
}

fn unavailable() -> BackendError {
    BackendError::Unavailable("collector down".to_string())
}

impl BackendSpan for FlakySpan {
    fn context(&self) -> &SpanContext {
        &self.context
    }

    fn set_attributes(&mut self, _attributes: &Projection) -> Result<(), BackendError> {
        Err(unavailable())
    }

    fn record_exception(&mut self, _error_type: &str, _message: &str) -> Result<(), BackendError> {
        Err(unavailable())
    }

    fn add_event(&mut self, _name: &str, _attributes: &Projection) -> Result<(), BackendError> {
        Err(unavailable())
    }

    fn set_status(&mut self, _status: SpanStatus) -> Result<(), BackendError> {
        Err(unavailable())
    }

    fn end(&mut self) -> Result<(), BackendError> {
        self.end_calls.fetch_add(1, Ordering::SeqCst);
        Err(unavailable())
    }
}

#[async_trait]
impl TracingBackend for FlakyBackend {
    fn start_span(
        &self,
        _name: &str,
        _kind: SpanKind,
        parent: Option<&SpanContext>,
        _attributes: &Projection,
    ) -> Result<Box<dyn BackendSpan>, BackendError> {
        let n = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let context = SpanContext {
            trace_id: format!("{:032x}", 0xabcu128),
            span_id: format!("{:016x}", n),
            parent_span_id: parent.map(|p| p.span_id.clone()),
        };
        Ok(Box::new(FlakySpan {
            context,
            end_calls: Arc::clone(&self.end_calls),
        }))
    }

    async fn flush(&self) -> Result<(), BackendError> {
        Err(unavailable())
    }
}

/// Backend that refuses to open any span
#[derive(Debug, Default)]
pub struct DownBackend;

#[async_trait]
impl TracingBackend for DownBackend {
    fn start_span(
        &self,
        _name: &str,
        _kind: SpanKind,
        _parent: Option<&SpanContext>,
        _attributes: &Projection,
    ) -> Result<Box<dyn BackendSpan>, BackendError> {
        Err(unavailable())
    }
}
