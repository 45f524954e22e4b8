//! The traced-operation primitive
//!
//! A [`TracedOperation`] opens a child span, makes it the ambient current
//! span while the work runs, and closes it afterwards on every path. The
//! outcome decides what is attached before closing:
//!
//! - `Ok`: `business.performance.duration_ms`,
//!   `business.operation.success = true`, the optional `on_success`
//!   attributes, status `Ok`.
//! - `Err`: the error's `errorCode` / `errorCategory` and sanitized message,
//!   `business.operation.success = false`, the duration, the optional
//!   `on_failure` attributes, status `Error`. The error itself is returned
//!   unchanged.
//!
//! ```rust
//! use bizctx::{BusinessContext, SpanRecorder};
//!
//! let recorder = SpanRecorder::disabled();
//! let result: Result<u32, std::io::Error> = recorder
//!     .traced("LoanService.countLoans", BusinessContext::new().customer_id("C-1"))
//!     .on_success(|count: &u32, ctx| ctx.result_count(*count as usize))
//!     .run(|| Ok(3));
//! assert_eq!(result.unwrap(), 3);
//! ```

use super::ambient::{self, AmbientContext};
use super::exporter::{SpanKind, SpanStatus};
use super::recorder::{Span, SpanRecorder};
use crate::context::{BusinessContext, OperationContext};
use crate::error::BusinessFailure;
use std::future::Future;
use std::time::Instant;

type AttributeHook<'a, V> = Box<dyn FnOnce(&V, BusinessContext) -> BusinessContext + Send + 'a>;

/// Scoped child span around one unit of work
#[must_use = "a traced operation does nothing until run"]
pub struct TracedOperation<'a, T, E> {
    recorder: SpanRecorder,
    name: String,
    context: BusinessContext,
    kind: SpanKind,
    on_success: Option<AttributeHook<'a, T>>,
    on_failure: Option<AttributeHook<'a, E>>,
}

impl<'a, T, E> TracedOperation<'a, T, E> {
    pub(crate) fn new(recorder: SpanRecorder, name: String, context: BusinessContext) -> Self {
        Self {
            recorder,
            name,
            context,
            kind: SpanKind::Internal,
            on_success: None,
            on_failure: None,
        }
    }

    /// Span kind; `Client` for calls to other services
    pub fn kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attributes derived from the successful result
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&T, BusinessContext) -> BusinessContext + Send + 'a,
    {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Extra attributes derived from the error
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&E, BusinessContext) -> BusinessContext + Send + 'a,
    {
        self.on_failure = Some(Box::new(f));
        self
    }

    fn open(&mut self) -> (Span, AmbientContext) {
        let context = std::mem::take(&mut self.context);
        let operation = OperationContext::current(self.name.as_str(), context);
        let span = self.recorder.start_child_of_kind(
            &self.name,
            self.kind,
            &operation.into_business_context(),
        );
        let scope = AmbientContext::child_of_current(span.handle());
        (span, scope)
    }

    fn finish(self, span: Span, started: Instant, result: &Result<T, E>)
    where
        E: BusinessFailure,
    {
        let outcome = BusinessContext::new().duration(started.elapsed());

        match result {
            Ok(value) => {
                let outcome = outcome.success(true);
                let outcome = match self.on_success {
                    Some(hook) => hook(value, outcome),
                    None => outcome,
                };
                span.attach(&outcome);
                span.set_status(SpanStatus::Ok);
            }
            Err(err) => {
                span.record_failure(err);
                let outcome = outcome.success(false);
                let outcome = match self.on_failure {
                    Some(hook) => hook(err, outcome),
                    None => outcome,
                };
                span.attach(&outcome);
                tracing::debug!(
                    operation = %self.name,
                    error_code = %err.error_code(),
                    "Traced operation failed"
                );
            }
        }
        span.close();
    }

    /// Run synchronous work under the span
    pub fn run<F>(mut self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: BusinessFailure,
    {
        let (span, scope) = self.open();
        let started = Instant::now();
        let result = ambient::sync_scope(scope, work);
        self.finish(span, started, &result);
        result
    }

    /// Run asynchronous work under the span
    pub async fn run_async<Fut>(mut self, work: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: BusinessFailure,
    {
        let (span, scope) = self.open();
        let started = Instant::now();
        let result = ambient::scope(scope, work).await;
        self.finish(span, started, &result);
        result
    }
}
