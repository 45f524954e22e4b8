//! Pluggable tracing backend seam
//!
//! [`SpanRecorder`](super::recorder::SpanRecorder) never talks to a tracing
//! SDK directly. It drives a [`TracingBackend`], which hands out
//! [`BackendSpan`] handles. Every backend operation is fallible, and every
//! failure is swallowed by the recorder: tracing must never change the
//! outcome of a business operation.

use super::exporter::{SpanKind, SpanStatus};
use crate::context::Projection;
use async_trait::async_trait;
use std::fmt;

/// Failure inside the tracing backend
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// Backend is not reachable or not initialised
    #[error("Tracing backend unavailable: {0}")]
    Unavailable(String),

    /// Operation on a span that was already ended
    #[error("Span already ended")]
    SpanEnded,

    /// Anything else the backend reports
    #[error("Tracing backend error: {0}")]
    Other(String),
}

/// Identity of a span, as seen by parents, children and exporters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpanContext {
    /// 128-bit trace id, lowercase hex
    pub trace_id: String,
    /// 64-bit span id, lowercase hex
    pub span_id: String,
    pub parent_span_id: Option<String>,
}

impl SpanContext {
    /// Context of a span that was never recorded
    pub fn invalid() -> Self {
        Self {
            trace_id: "0".repeat(32),
            span_id: "0".repeat(16),
            parent_span_id: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.trace_id.bytes().any(|b| b != b'0') && self.span_id.bytes().any(|b| b != b'0')
    }
}

impl fmt::Display for SpanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.trace_id, self.span_id)
    }
}

/// Generate a random 128-bit trace ID as hex string
pub(crate) fn generate_trace_id() -> String {
    format!("{:032x}", fastrand::u128(1..))
}

/// Generate a random 64-bit span ID as hex string
pub(crate) fn generate_span_id() -> String {
    format!("{:016x}", fastrand::u64(1..))
}

/// Factory for backend spans
#[async_trait]
pub trait TracingBackend: Send + Sync + fmt::Debug {
    /// Start a span; `parent` is `None` for a root span
    fn start_span(
        &self,
        name: &str,
        kind: SpanKind,
        parent: Option<&SpanContext>,
        attributes: &Projection,
    ) -> Result<Box<dyn BackendSpan>, BackendError>;

    /// Push queued spans to their sink; a no-op for self-flushing backends
    async fn flush(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// One open span inside a backend
pub trait BackendSpan: Send + Sync {
    fn context(&self) -> &SpanContext;

    /// Add attributes; later values win on key collision
    fn set_attributes(&mut self, attributes: &Projection) -> Result<(), BackendError>;

    /// Record an `exception` event for `message`
    fn record_exception(&mut self, error_type: &str, message: &str) -> Result<(), BackendError>;

    /// Add a timestamped named event
    fn add_event(&mut self, name: &str, attributes: &Projection) -> Result<(), BackendError>;

    fn set_status(&mut self, status: SpanStatus) -> Result<(), BackendError>;

    /// End the span; called at most once
    fn end(&mut self) -> Result<(), BackendError>;
}

/// Backend that records nothing
///
/// Used when tracing is disabled in configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackend;

struct NoopSpan {
    context: SpanContext,
}

impl BackendSpan for NoopSpan {
    fn context(&self) -> &SpanContext {
        &self.context
    }

    fn set_attributes(&mut self, _attributes: &Projection) -> Result<(), BackendError> {
        Ok(())
    }

    fn record_exception(&mut self, _error_type: &str, _message: &str) -> Result<(), BackendError> {
        Ok(())
    }

    fn add_event(&mut self, _name: &str, _attributes: &Projection) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_status(&mut self, _status: SpanStatus) -> Result<(), BackendError> {
        Ok(())
    }

    fn end(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}

#[async_trait]
impl TracingBackend for NoopBackend {
    fn start_span(
        &self,
        _name: &str,
        _kind: SpanKind,
        parent: Option<&SpanContext>,
        _attributes: &Projection,
    ) -> Result<Box<dyn BackendSpan>, BackendError> {
        // Keep the parent's trace id so correlation still lines up in logs
        let context = match parent {
            Some(parent) => SpanContext {
                trace_id: parent.trace_id.clone(),
                span_id: generate_span_id(),
                parent_span_id: Some(parent.span_id.clone()),
            },
            None => SpanContext {
                trace_id: generate_trace_id(),
                span_id: generate_span_id(),
                parent_span_id: None,
            },
        };
        Ok(Box::new(NoopSpan { context }))
    }
}
