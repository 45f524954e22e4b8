//! Persistence interception
//!
//! [`PersistenceAspect`] wraps a repository call in a child span named
//! `"{entity}.{method}"`. The method name decides the operation category
//! recorded as `persistence.operation.type`:
//!
//! | prefix                              | category  |
//! |-------------------------------------|-----------|
//! | `save`, `insert`                    | `write`   |
//! | `delete`, `remove`                  | `delete`  |
//! | `find`, `get`, `exists`, `count`    | `read`    |
//! | anything else                       | `generic` |
//!
//! On success the result's [`Traceable`] projection is attached, together
//! with `persistence.batch_size` when the result is a collection or a number
//! and `persistence.duration_ms`. Errors are recorded and returned unchanged.
//!
//! Repositories normally don't call the aspect themselves; the
//! `#[traced_repository]` attribute rewrites their methods to go through
//! [`Intercepted::aspect`].

use crate::context::{keys, BusinessContext, Traceable};
use crate::error::BusinessFailure;
use crate::telemetry::recorder::SpanRecorder;
use std::fmt;
use std::future::Future;
use std::time::Instant;

/// Kind of persistence call, derived from the method name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationCategory {
    Read,
    Write,
    Delete,
    Generic,
}

const WRITE_PREFIXES: &[&str] = &["save", "insert"];
const DELETE_PREFIXES: &[&str] = &["delete", "remove"];
const READ_PREFIXES: &[&str] = &["find", "get", "exists", "count"];

impl OperationCategory {
    /// Classify by method-name prefix; case-sensitive
    pub fn classify(method: &str) -> Self {
        let matches = |prefixes: &[&str]| prefixes.iter().any(|p| method.starts_with(p));

        if matches(WRITE_PREFIXES) {
            Self::Write
        } else if matches(DELETE_PREFIXES) {
            Self::Delete
        } else if matches(READ_PREFIXES) {
            Self::Read
        } else {
            Self::Generic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records a child span around each intercepted persistence call
#[derive(Debug, Clone)]
pub struct PersistenceAspect {
    recorder: SpanRecorder,
}

impl PersistenceAspect {
    pub fn new(recorder: SpanRecorder) -> Self {
        Self { recorder }
    }

    pub fn recorder(&self) -> &SpanRecorder {
        &self.recorder
    }

    fn context(entity: &str, method: &str, category: OperationCategory) -> BusinessContext {
        BusinessContext::new()
            .attribute(keys::PERSISTENCE_OPERATION_TYPE, category.as_str())
            .attribute(keys::PERSISTENCE_METHOD, method)
            .attribute(keys::PERSISTENCE_ENTITY, entity)
    }

    fn describe_result<T: Traceable>(
        value: &T,
        started: Instant,
        ctx: BusinessContext,
    ) -> BusinessContext {
        let ctx = match value.batch_size() {
            Some(size) => ctx.attribute(keys::PERSISTENCE_BATCH_SIZE, size),
            None => ctx,
        };
        let elapsed = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        ctx.describe(value)
            .attribute(keys::PERSISTENCE_DURATION_MS, elapsed)
    }

    /// Intercept a synchronous repository call
    pub fn intercept<T, E, F>(&self, entity: &str, method: &str, call: F) -> Result<T, E>
    where
        T: Traceable,
        E: BusinessFailure,
        F: FnOnce() -> Result<T, E>,
    {
        let category = OperationCategory::classify(method);
        tracing::trace!(entity, method, %category, "Intercepting persistence call");

        let started = Instant::now();
        self.recorder
            .traced(
                format!("{}.{}", entity, method),
                Self::context(entity, method, category),
            )
            .on_success(move |value: &T, ctx| Self::describe_result(value, started, ctx))
            .run(call)
    }

    /// Intercept an asynchronous repository call
    pub async fn intercept_async<T, E, Fut>(
        &self,
        entity: &str,
        method: &str,
        call: Fut,
    ) -> Result<T, E>
    where
        T: Traceable,
        E: BusinessFailure,
        Fut: Future<Output = Result<T, E>>,
    {
        let category = OperationCategory::classify(method);
        tracing::trace!(entity, method, %category, "Intercepting persistence call");

        let started = Instant::now();
        self.recorder
            .traced(
                format!("{}.{}", entity, method),
                Self::context(entity, method, category),
            )
            .on_success(move |value: &T, ctx| Self::describe_result(value, started, ctx))
            .run_async(call)
            .await
    }
}

/// A repository that routes its calls through a [`PersistenceAspect`]
///
/// Required by `#[traced_repository]`.
pub trait Intercepted {
    fn aspect(&self) -> &PersistenceAspect;
}
