//! Fluent business-context builder
//!
//! [`BusinessContext`] is a value type. Every setter consumes the context
//! and returns the updated value, so a context is always owned by exactly
//! one call tree and chained setters never alias shared state:
//!
//! ```rust
//! use bizctx::context::{keys, BusinessContext};
//!
//! let ctx = BusinessContext::new()
//!     .customer_id("C-1001")
//!     .customer_email("johndoe@example.com")
//!     .card_number("4111111111111111")
//!     .card_type("CREDIT");
//!
//! let projection = ctx.projection();
//! assert_eq!(
//!     projection.get(keys::CARD_NUMBER).and_then(|v| v.as_str()),
//!     Some("************1111")
//! );
//! ```
//!
//! Setters never fail and never read external state. Optional fields are
//! handled by the caller omitting the call.

use super::attributes::{AttributeBag, AttributeValue, Projection};
use super::keys;
use super::Traceable;
use crate::error::{BusinessFailure, ErrorCategory};
use crate::telemetry::correlation::CorrelationId;
use crate::utils::masking::{self, MaskKind};
use std::time::Duration;

/// Accumulates business attributes for one traced operation
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use]
pub struct BusinessContext {
    bag: AttributeBag,
}

impl BusinessContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing bag
    pub fn from_bag(bag: AttributeBag) -> Self {
        Self { bag }
    }

    fn set(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.bag.set(key, value);
        self
    }

    fn set_masked(mut self, key: &str, kind: MaskKind, raw: &str) -> Self {
        self.bag.set_masked(key, kind, raw);
        self
    }

    // ========================================================================
    // Operation
    // ========================================================================

    pub fn operation(self, name: impl Into<String>) -> Self {
        self.set(keys::OPERATION_NAME, name.into())
    }

    pub fn operation_type(self, kind: impl Into<String>) -> Self {
        self.set(keys::OPERATION_TYPE, kind.into())
    }

    pub fn service(self, name: impl Into<String>) -> Self {
        self.set(keys::SERVICE_NAME, name.into())
    }

    pub fn correlation_id(self, id: &CorrelationId) -> Self {
        self.set(keys::CORRELATION_ID, id.as_str())
    }

    pub fn success(self, success: bool) -> Self {
        self.set(keys::OPERATION_SUCCESS, success)
    }

    // ========================================================================
    // Customer
    // ========================================================================

    pub fn customer_id(self, id: impl Into<String>) -> Self {
        self.set(keys::CUSTOMER_ID, id.into())
    }

    /// Stores the masked email only
    pub fn customer_email(self, email: &str) -> Self {
        self.set_masked(keys::CUSTOMER_EMAIL, MaskKind::Email, email)
    }

    /// Stores the masked phone number only
    pub fn customer_phone(self, phone: &str) -> Self {
        self.set_masked(keys::CUSTOMER_PHONE, MaskKind::Phone, phone)
    }

    pub fn customer_segment(self, segment: impl Into<String>) -> Self {
        self.set(keys::CUSTOMER_SEGMENT, segment.into())
    }

    // ========================================================================
    // Account
    // ========================================================================

    pub fn account_number(self, number: impl Into<String>) -> Self {
        self.set(keys::ACCOUNT_NUMBER, number.into())
    }

    pub fn account_type(self, kind: impl Into<String>) -> Self {
        self.set(keys::ACCOUNT_TYPE, kind.into())
    }

    pub fn branch(self, branch: impl Into<String>) -> Self {
        self.set(keys::ACCOUNT_BRANCH, branch.into())
    }

    // ========================================================================
    // Card
    // ========================================================================

    /// Stores the masked card number only
    pub fn card_number(self, number: &str) -> Self {
        self.set_masked(keys::CARD_NUMBER, MaskKind::CardNumber, number)
    }

    pub fn card_type(self, kind: impl Into<String>) -> Self {
        self.set(keys::CARD_TYPE, kind.into())
    }

    pub fn card_status(self, status: impl Into<String>) -> Self {
        self.set(keys::CARD_STATUS, status.into())
    }

    pub fn card_limit(self, limit: f64) -> Self {
        self.set(keys::CARD_LIMIT, limit)
    }

    pub fn card_available_amount(self, amount: f64) -> Self {
        self.set(keys::CARD_AVAILABLE_AMOUNT, amount)
    }

    // ========================================================================
    // Loan
    // ========================================================================

    pub fn loan_number(self, number: impl Into<String>) -> Self {
        self.set(keys::LOAN_NUMBER, number.into())
    }

    pub fn loan_type(self, kind: impl Into<String>) -> Self {
        self.set(keys::LOAN_TYPE, kind.into())
    }

    pub fn loan_amount(self, amount: f64) -> Self {
        self.set(keys::LOAN_AMOUNT, amount)
    }

    pub fn loan_outstanding(self, amount: f64) -> Self {
        self.set(keys::LOAN_OUTSTANDING, amount)
    }

    pub fn loan_status(self, status: impl Into<String>) -> Self {
        self.set(keys::LOAN_STATUS, status.into())
    }

    // ========================================================================
    // Transaction
    // ========================================================================

    pub fn transaction_id(self, id: impl Into<String>) -> Self {
        self.set(keys::TRANSACTION_ID, id.into())
    }

    pub fn transaction_type(self, kind: impl Into<String>) -> Self {
        self.set(keys::TRANSACTION_TYPE, kind.into())
    }

    pub fn transaction_amount(self, amount: f64) -> Self {
        self.set(keys::TRANSACTION_AMOUNT, amount)
    }

    pub fn transaction_currency(self, currency: impl Into<String>) -> Self {
        self.set(keys::TRANSACTION_CURRENCY, currency.into())
    }

    // ========================================================================
    // Error
    // ========================================================================

    /// Record an `errorCode` / `errorCategory` pair
    pub fn error(self, code: impl Into<String>, category: ErrorCategory) -> Self {
        self.set(keys::ERROR_CODE, code.into())
            .set(keys::ERROR_CATEGORY, category.as_str())
    }

    /// Sanitized and truncated free-text error message
    pub fn error_message(self, message: &str) -> Self {
        let message = masking::truncate_string(
            &masking::sanitize_message(message),
            keys::ERROR_MESSAGE_MAX_CHARS,
        );
        self.set(keys::ERROR_MESSAGE, message)
    }

    /// Code, category and message of a business failure
    pub fn failure<E: BusinessFailure + ?Sized>(self, err: &E) -> Self {
        let code = err.error_code().into_owned();
        self.error(code, err.error_category())
            .error_message(&err.to_string())
    }

    // ========================================================================
    // Performance
    // ========================================================================

    pub fn duration(self, elapsed: Duration) -> Self {
        let millis = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
        self.set(keys::DURATION_MS, millis)
    }

    pub fn result_count(self, count: usize) -> Self {
        self.set(keys::RESULT_COUNT, count)
    }

    pub fn batch_size(self, size: usize) -> Self {
        self.set(keys::BATCH_SIZE, size)
    }

    // ========================================================================
    // Downstream service call
    // ========================================================================

    pub fn service_call(self, target: impl Into<String>, operation: impl Into<String>) -> Self {
        self.set(keys::SERVICE_CALL_TARGET, target.into())
            .set(keys::SERVICE_CALL_OPERATION, operation.into())
    }

    pub fn service_call_success(self, success: bool) -> Self {
        self.set(keys::SERVICE_CALL_SUCCESS, success)
    }

    // ========================================================================
    // Generic
    // ========================================================================

    /// Escape hatch for keys outside the standard schema
    pub fn attribute(self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.set(key, value)
    }

    /// Let an entity describe itself into this context
    pub fn describe<T: Traceable + ?Sized>(self, entity: &T) -> Self {
        entity.describe(self)
    }

    /// Merge another context in; `other` wins on key collision
    pub fn merge(mut self, other: &BusinessContext) -> Self {
        self.bag.merge(&other.bag);
        self
    }

    pub fn bag(&self) -> &AttributeBag {
        &self.bag
    }

    pub fn into_bag(self) -> AttributeBag {
        self.bag
    }

    pub fn projection(&self) -> Projection {
        self.bag.to_projection()
    }

    pub fn is_empty(&self) -> bool {
        self.bag.is_empty()
    }
}

impl From<AttributeBag> for BusinessContext {
    fn from(bag: AttributeBag) -> Self {
        Self::from_bag(bag)
    }
}
