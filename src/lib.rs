//! Business-context tracing for banking microservices.
//!
//! bizctx records what a request *did* in business terms: which customer,
//! card, loan or transaction it touched, whether it succeeded, how long it
//! took and which persistence calls it made. Sensitive values (card numbers,
//! emails, phone numbers) are masked when they are added, so the raw value
//! never reaches a span or an info-level log line.
//!
//! # Quick Start
//!
//! ```no_run
//! use bizctx::config::TracerConfig;
//! use bizctx::{BusinessContext, RequestCorrelation};
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("card {0} not found")]
//! struct CardNotFound(String);
//!
//! impl bizctx::BusinessFailure for CardNotFound {
//!     fn error_code(&self) -> std::borrow::Cow<'_, str> {
//!         "CARD_NOT_FOUND".into()
//!     }
//!
//!     fn error_category(&self) -> bizctx::ErrorCategory {
//!         bizctx::ErrorCategory::NotFound
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TracerConfig::load("tracing.toml")?;
//!     let recorder = bizctx::telemetry::init_recorder(&config)?;
//!
//!     let card = RequestCorrelation::begin(&recorder, "GET /cards/{id}", BusinessContext::new())
//!         .with_inbound_id("3f0c9a4e-8d2b-4a55-9c1e-7b6f2d1a0e93")
//!         .run_async(|_correlation_id| {
//!             recorder
//!                 .traced(
//!                     "CardService.getCard",
//!                     BusinessContext::new()
//!                         .customer_id("C-1001")
//!                         .card_number("4111111111111111"),
//!                 )
//!                 .on_success(|status: &String, ctx| ctx.card_status(status.as_str()))
//!                 .run_async(async { Ok::<_, CardNotFound>("ACTIVE".to_string()) })
//!         })
//!         .await?;
//!
//!     println!("card status: {}", card);
//!     recorder.flush().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture Overview
//!
//! - **[`BusinessContext`]** - fluent, value-typed attribute builder over an
//!   [`AttributeBag`], with domain setters and masking
//! - **[`SpanRecorder`]** - opens root and child spans on a pluggable
//!   [`telemetry::TracingBackend`] and exposes the [`TracedOperation`]
//!   primitive
//! - **[`RequestCorrelation`]** - per-request [`CorrelationId`] and root span,
//!   scoped to the request's task
//! - **[`PersistenceAspect`]** - child spans around repository calls, applied
//!   with [`traced_repository`]
//!
//! Telemetry never fails a request: backend errors are logged at debug level,
//! counted, and reported at warn level every N failures.
//!
//! # Module Organization
//!
//! - [`context`] - attribute storage, key schema, builder and [`Traceable`]
//! - [`telemetry`] - recorder, correlation, backends, exporters and logging
//! - [`aspect`] - persistence interception
//! - [`config`] - file and environment configuration
//! - [`error`] - crate error type and the [`BusinessFailure`] trait
//! - [`utils`] - masking and sanitizing helpers

// Lets `#[traced_repository]` expansions name `::bizctx` inside this crate.
extern crate self as bizctx;

pub mod aspect;
pub mod config;
pub mod context;
pub mod error;
pub mod telemetry;
pub mod utils;

pub use aspect::{Intercepted, OperationCategory, PersistenceAspect};
pub use config::TracerConfig;
pub use context::{AttributeBag, AttributeValue, BusinessContext, Traceable};
pub use error::{BizctxError, BusinessFailure, ErrorCategory};
pub use telemetry::{CorrelationId, RequestCorrelation, Span, SpanRecorder, TracedOperation};
pub use utils::masking::MaskKind;

pub use bizctx_macros::traced_repository;

pub type Result<T> = std::result::Result<T, BizctxError>;
