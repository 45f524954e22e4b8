//! Span recording
//!
//! [`SpanRecorder`] is the entry point services use to open, enrich and
//! close spans. It is a cheap `Clone` value built once at startup and passed
//! to components; there is no global recorder.
//!
//! Every opened [`Span`] is ended exactly once. [`Span::close`] consumes the
//! handle, and a handle dropped while still open (early return, `?`, panic
//! unwinding) is closed by its `Drop` impl.
//!
//! None of the operations here return errors. Backend failures are logged at
//! debug level, counted, and otherwise ignored; a business operation must
//! never fail because its telemetry did.

use super::ambient;
use super::backend::{BackendError, BackendSpan, NoopBackend, SpanContext, TracingBackend};
use super::exporter::{SpanKind, SpanStatus};
use super::traced::TracedOperation;
use crate::context::{keys, BusinessContext, Projection};
use crate::error::{BizctxError, BusinessFailure};
use crate::utils::masking;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Default number of swallowed failures between warn-level alerts
pub const DEFAULT_FAILURE_ALERT_THRESHOLD: u64 = 100;

/// Counter of swallowed backend failures
#[derive(Debug)]
pub(crate) struct BackendHealth {
    failures: AtomicU64,
    alert_threshold: u64,
}

impl BackendHealth {
    fn new(alert_threshold: u64) -> Self {
        Self {
            failures: AtomicU64::new(0),
            alert_threshold,
        }
    }

    fn record(&self, operation: &'static str, err: &BackendError) {
        let count = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(operation, error = %err, "Tracing backend call failed");

        if self.alert_threshold > 0 && count % self.alert_threshold == 0 {
            tracing::warn!(
                failures = count,
                "Tracing backend has failed {} times; spans are being dropped",
                count
            );
        }
    }

    fn count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

struct SpanInner {
    context: SpanContext,
    backend: Mutex<Option<Box<dyn BackendSpan>>>,
    health: Arc<BackendHealth>,
}

impl SpanInner {
    /// Run `op` against the backend span if it is still open
    fn with_open(
        &self,
        operation: &'static str,
        op: impl FnOnce(&mut dyn BackendSpan) -> Result<(), BackendError>,
    ) {
        let mut guard = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(span) = guard.as_mut() {
            if let Err(e) = op(&mut **span) {
                self.health.record(operation, &e);
            }
        }
    }

    fn end(&self) {
        let taken = self
            .backend
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut span) = taken {
            if let Err(e) = span.end() {
                self.health.record("end", &e);
            }
        }
    }

    fn is_open(&self) -> bool {
        self.backend
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Shared, non-owning reference to a span held by the ambient scope
///
/// Outliving the owning [`Span`] is harmless: once the span is closed every
/// operation through the handle is a no-op.
#[derive(Clone)]
pub(crate) struct SpanHandle(Arc<SpanInner>);

impl SpanHandle {
    pub(crate) fn context(&self) -> &SpanContext {
        &self.0.context
    }

    fn add_event(&self, name: &str, attributes: &Projection) {
        self.0
            .with_open("add_event", |span| span.add_event(name, attributes));
    }
}

/// An open span, exclusively owned by the operation that opened it
#[must_use = "a span is closed as soon as it is dropped"]
pub struct Span {
    inner: Arc<SpanInner>,
}

impl Span {
    fn new(
        context: SpanContext,
        backend: Option<Box<dyn BackendSpan>>,
        health: Arc<BackendHealth>,
    ) -> Self {
        Self {
            inner: Arc::new(SpanInner {
                context,
                backend: Mutex::new(backend),
                health,
            }),
        }
    }

    pub fn context(&self) -> &SpanContext {
        &self.inner.context
    }

    /// False for spans the backend failed to create
    pub fn is_recording(&self) -> bool {
        self.inner.is_open()
    }

    pub(crate) fn handle(&self) -> SpanHandle {
        SpanHandle(Arc::clone(&self.inner))
    }

    /// Add the context's attributes; later calls win on key collision
    pub fn attach(&self, context: &BusinessContext) {
        let projection = context.projection();
        self.inner
            .with_open("set_attributes", |span| span.set_attributes(&projection));
    }

    /// Record `err` on the span and mark it failed; the span stays open
    pub fn record_failure<E: BusinessFailure + ?Sized>(&self, err: &E) {
        let code = err.error_code().into_owned();
        let message = masking::truncate_string(
            &masking::sanitize_message(&err.to_string()),
            keys::ERROR_MESSAGE_MAX_CHARS,
        );

        self.attach(&BusinessContext::new().failure(err).success(false));
        self.inner.with_open("record_exception", |span| {
            span.record_exception(&code, &message)
        });
        self.set_status(SpanStatus::Error { message });
    }

    /// Add a timestamped event carrying the context's attributes
    pub fn record_event(&self, name: &str, context: &BusinessContext) {
        self.handle().add_event(name, &context.projection());
    }

    pub fn set_status(&self, status: SpanStatus) {
        self.inner
            .with_open("set_status", move |span| span.set_status(status));
    }

    /// End the span
    pub fn close(self) {
        self.inner.end();
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        // No-op when already closed
        self.inner.end();
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("context", &self.inner.context)
            .field("recording", &self.is_recording())
            .finish()
    }
}

/// Opens spans against a [`TracingBackend`]
#[derive(Clone)]
pub struct SpanRecorder {
    backend: Arc<dyn TracingBackend>,
    health: Arc<BackendHealth>,
    service_name: Option<Arc<str>>,
}

impl fmt::Debug for SpanRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanRecorder")
            .field("backend", &self.backend)
            .field("service_name", &self.service_name)
            .field("backend_failures", &self.health.count())
            .finish()
    }
}

impl SpanRecorder {
    pub fn new(backend: Arc<dyn TracingBackend>) -> Self {
        Self {
            backend,
            health: Arc::new(BackendHealth::new(DEFAULT_FAILURE_ALERT_THRESHOLD)),
            service_name: None,
        }
    }

    /// Recorder whose spans go nowhere
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopBackend))
    }

    /// Stamp root spans with `business.service.name`
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(Arc::from(name.into()));
        self
    }

    /// Warn every `threshold` swallowed backend failures (0 disables)
    ///
    /// Resets the failure counter; call before cloning the recorder.
    pub fn with_failure_alert_threshold(mut self, threshold: u64) -> Self {
        self.health = Arc::new(BackendHealth::new(threshold));
        self
    }

    /// Swallowed backend failures since this recorder was built
    pub fn backend_failure_count(&self) -> u64 {
        self.health.count()
    }

    fn open(
        &self,
        name: &str,
        kind: SpanKind,
        parent: Option<&SpanContext>,
        context: &BusinessContext,
    ) -> Span {
        let projection = context.projection();
        match self.backend.start_span(name, kind, parent, &projection) {
            Ok(span) => {
                let span_context = span.context().clone();
                Span::new(span_context, Some(span), Arc::clone(&self.health))
            }
            Err(e) => {
                self.health.record("start_span", &e);
                let mut span_context = SpanContext::invalid();
                span_context.parent_span_id = parent.map(|p| p.span_id.clone());
                Span::new(span_context, None, Arc::clone(&self.health))
            }
        }
    }

    /// Open a span with no parent
    pub fn start_root(&self, name: &str, context: &BusinessContext) -> Span {
        self.open_root(name, SpanKind::Server, context)
    }

    fn open_root(&self, name: &str, kind: SpanKind, context: &BusinessContext) -> Span {
        let context = match &self.service_name {
            Some(service) => BusinessContext::new()
                .service(service.as_ref())
                .merge(context),
            None => context.clone(),
        };
        self.open(name, kind, None, &context)
    }

    /// Open a span under the ambient current span, or a root span without one
    ///
    /// A current span the backend failed to start counts as no parent.
    pub fn start_child(&self, name: &str, context: &BusinessContext) -> Span {
        self.start_child_of_kind(name, SpanKind::Internal, context)
    }

    pub(crate) fn start_child_of_kind(
        &self,
        name: &str,
        kind: SpanKind,
        context: &BusinessContext,
    ) -> Span {
        match ambient::current_span().filter(|parent| parent.context().is_valid()) {
            Some(parent) => self.open(name, kind, Some(parent.context()), context),
            None => self.open_root(name, kind, context),
        }
    }

    /// Add the context's attributes to an open span
    pub fn attach(&self, span: &Span, context: &BusinessContext) {
        span.attach(context);
    }

    /// Record a failure on `span` without closing it
    pub fn record_failure<E: BusinessFailure + ?Sized>(&self, span: &Span, err: &E) {
        span.record_failure(err);
    }

    /// Add an event to the ambient current span; no-op without one
    pub fn record_event(&self, name: &str, context: &BusinessContext) {
        if let Some(span) = ambient::current_span() {
            span.add_event(name, &context.projection());
        }
    }

    pub fn close(&self, span: Span) {
        span.close();
    }

    /// Scoped child span around one unit of work
    ///
    /// See [`TracedOperation`] for the success and failure attributes.
    pub fn traced<'a, T, E>(
        &self,
        name: impl Into<String>,
        context: BusinessContext,
    ) -> TracedOperation<'a, T, E> {
        TracedOperation::new(self.clone(), name.into(), context)
    }

    /// Export queued spans
    ///
    /// Meant for shutdown and tests; request paths never call it.
    pub async fn flush(&self) -> Result<(), BizctxError> {
        self.backend.flush().await.map_err(|e| {
            self.health.record("flush", &e);
            BizctxError::export_error(e.to_string())
        })
    }
}
