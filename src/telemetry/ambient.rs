//! Ambient (task-local) tracing context
//!
//! The current correlation id and current span live in a tokio task-local.
//! A scope is entered with [`scope`] (async) or [`sync_scope`] (sync) and is
//! gone once the wrapped work completes, whatever its outcome. Tasks never
//! inherit a scope implicitly: use [`fork`] or [`spawn_in_context`] to carry
//! it into parallel sub-operations.

use super::backend::SpanContext;
use super::correlation::CorrelationId;
use super::recorder::SpanHandle;
use futures::future::Either;
use std::future::Future;

tokio::task_local! {
    static AMBIENT: AmbientContext;
}

/// What the current task knows about its request
#[derive(Clone, Default)]
pub struct AmbientContext {
    correlation_id: Option<CorrelationId>,
    span: Option<SpanHandle>,
}

impl AmbientContext {
    pub(crate) fn new(correlation_id: Option<CorrelationId>, span: Option<SpanHandle>) -> Self {
        Self {
            correlation_id,
            span,
        }
    }

    /// Same correlation id as the current scope, with `span` as current span
    pub(crate) fn child_of_current(span: SpanHandle) -> Self {
        Self {
            correlation_id: current_correlation_id(),
            span: Some(span),
        }
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    pub fn span_context(&self) -> Option<&SpanContext> {
        self.span.as_ref().map(SpanHandle::context)
    }
}

impl std::fmt::Debug for AmbientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmbientContext")
            .field("correlation_id", &self.correlation_id)
            .field("span", &self.span_context())
            .finish()
    }
}

/// Snapshot of the current scope, if any
pub fn current() -> Option<AmbientContext> {
    AMBIENT.try_with(Clone::clone).ok()
}

/// Correlation id of the current request
pub fn current_correlation_id() -> Option<CorrelationId> {
    AMBIENT
        .try_with(|ctx| ctx.correlation_id.clone())
        .ok()
        .flatten()
}

/// Identity of the current span
pub fn current_span_context() -> Option<SpanContext> {
    AMBIENT
        .try_with(|ctx| ctx.span_context().cloned())
        .ok()
        .flatten()
}

pub(crate) fn current_span() -> Option<SpanHandle> {
    AMBIENT.try_with(|ctx| ctx.span.clone()).ok().flatten()
}

/// Run `f` with `ctx` as the ambient context
pub async fn scope<F: Future>(ctx: AmbientContext, f: F) -> F::Output {
    AMBIENT.scope(ctx, f).await
}

/// Run `f` with `ctx` as the ambient context, synchronously
pub fn sync_scope<R>(ctx: AmbientContext, f: impl FnOnce() -> R) -> R {
    AMBIENT.sync_scope(ctx, f)
}

/// Carry the current ambient context into `f`
///
/// Needed for work driven outside the current task's poll, such as
/// `tokio::spawn` or a `join_all` over freshly built futures that are polled
/// later.
pub fn fork<F: Future>(f: F) -> impl Future<Output = F::Output> {
    match current() {
        Some(ctx) => Either::Left(AMBIENT.scope(ctx, f)),
        None => Either::Right(f),
    }
}

/// `tokio::spawn` with the current ambient context copied into the task
pub fn spawn_in_context<F>(f: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(fork(f))
}
