//! Per-request correlation
//!
//! Every inbound request gets one [`CorrelationId`]. [`RequestCorrelation`]
//! mints it (or adopts the gateway's `X-Correlation-Id`), opens the root
//! span and runs the request body inside an ambient scope so that every
//! nested service and persistence span carries the same id.

use super::ambient::{self, AmbientContext};
use super::recorder::{Span, SpanRecorder};
use crate::context::BusinessContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use tracing::Instrument;
use uuid::Uuid;

/// HTTP header carrying the correlation id between services
pub const CORRELATION_HEADER: &str = "X-Correlation-Id";

/// Longest inbound correlation id that is adopted as-is
pub const MAX_INBOUND_ID_CHARS: usize = 128;

/// Correlation identifier for one inbound request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mint a fresh UUID v4 id
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }

    /// Adopt an id received from upstream
    ///
    /// Returns `None` for blank values, values longer than
    /// [`MAX_INBOUND_ID_CHARS`] and values containing control characters.
    pub fn from_inbound(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.chars().count() > MAX_INBOUND_ID_CHARS
            || trimmed.chars().any(char::is_control)
        {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Request-scoped root span plus ambient correlation scope
///
/// ```rust
/// use bizctx::{BusinessContext, RequestCorrelation, SpanRecorder};
///
/// let recorder = SpanRecorder::disabled();
/// let id = RequestCorrelation::begin(&recorder, "GET /cards/{id}", BusinessContext::new())
///     .with_inbound_id("gw-7f3a")
///     .run(|id| id.clone());
/// assert_eq!(id.as_str(), "gw-7f3a");
/// ```
#[must_use = "a request correlation does nothing until run"]
pub struct RequestCorrelation {
    recorder: SpanRecorder,
    name: String,
    context: BusinessContext,
    inbound_id: Option<String>,
}

impl RequestCorrelation {
    pub fn begin(
        recorder: &SpanRecorder,
        name: impl Into<String>,
        base_context: BusinessContext,
    ) -> Self {
        Self {
            recorder: recorder.clone(),
            name: name.into(),
            context: base_context,
            inbound_id: None,
        }
    }

    /// Reuse the id supplied by the gateway when it is acceptable
    pub fn with_inbound_id(mut self, raw: &str) -> Self {
        self.inbound_id = Some(raw.to_string());
        self
    }

    fn open(self) -> (String, CorrelationId, Span) {
        let correlation_id = match self.inbound_id.as_deref() {
            Some(raw) => CorrelationId::from_inbound(raw).unwrap_or_else(|| {
                tracing::debug!("Rejected inbound correlation id, minting a new one");
                CorrelationId::new()
            }),
            None => CorrelationId::new(),
        };

        let context = self
            .context
            .operation(self.name.as_str())
            .operation_type("request")
            .correlation_id(&correlation_id);
        let span = self.recorder.start_root(&self.name, &context);
        (self.name, correlation_id, span)
    }

    /// Run a synchronous request body
    pub fn run<R>(self, body: impl FnOnce(&CorrelationId) -> R) -> R {
        let (name, correlation_id, span) = self.open();
        let scope = AmbientContext::new(Some(correlation_id.clone()), Some(span.handle()));

        let _entered =
            tracing::info_span!("request", operation = %name, correlation_id = %correlation_id)
                .entered();
        let result = ambient::sync_scope(scope, || body(&correlation_id));
        span.close();
        result
    }

    /// Run an asynchronous request body
    pub async fn run_async<F, Fut>(self, body: F) -> Fut::Output
    where
        F: FnOnce(CorrelationId) -> Fut,
        Fut: Future,
    {
        let (name, correlation_id, span) = self.open();
        let scope = AmbientContext::new(Some(correlation_id.clone()), Some(span.handle()));
        let log_span =
            tracing::info_span!("request", operation = %name, correlation_id = %correlation_id);

        let result = ambient::scope(scope, body(correlation_id))
            .instrument(log_span)
            .await;
        span.close();
        result
    }
}
