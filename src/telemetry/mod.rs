//! Span recording, correlation and export
//!
//! # Quick Start
//!
//! ```no_run
//! use bizctx::config::TracerConfig;
//! use bizctx::{BusinessContext, RequestCorrelation};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TracerConfig::load("tracing.toml")?;
//!     let recorder = bizctx::telemetry::init_recorder(&config)?;
//!
//!     RequestCorrelation::begin(&recorder, "GET /cards/{id}", BusinessContext::new())
//!         .run_async(|_correlation_id| async {
//!             // service code
//!         })
//!         .await;
//!
//!     recorder.flush().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Key Types
//!
//! - [`SpanRecorder`] - opens, enriches and closes spans
//! - [`TracedOperation`] - scoped child span around a unit of work
//! - [`RequestCorrelation`] - per-request root span and correlation scope
//! - [`TracingBackend`] - seam between the recorder and a tracing SDK

pub mod ambient;
pub mod backend;
pub mod correlation;
pub mod exporter;
pub mod logging;
pub mod otel;
pub mod recorder;
pub mod recording;
pub mod test_harness;
pub mod traced;

pub use backend::{BackendError, NoopBackend, SpanContext, TracingBackend};
pub use correlation::{CorrelationId, RequestCorrelation};
pub use exporter::{SpanData, SpanExporter, SpanKind, SpanStatus};
pub use logging::{init_logging, LoggingConfig, LoggingGuard};
pub use otel::OtelBackend;
pub use recorder::{Span, SpanRecorder};
pub use recording::RecordingBackend;
pub use test_harness::TracingTestHarness;
pub use traced::TracedOperation;

use crate::config::{BackendConfig, TracerConfig};
use crate::error::BizctxError;
use exporter::{NoOpExporter, StdoutExporter};
use std::sync::Arc;

/// Build the recorder described by `config`
///
/// The OpenTelemetry backend installs the global tracer provider and must be
/// built from within a tokio runtime.
pub fn init_recorder(config: &TracerConfig) -> Result<SpanRecorder, BizctxError> {
    config.validate()?;

    if !config.enabled {
        tracing::info!("Tracing disabled, spans will not be recorded");
        return Ok(SpanRecorder::disabled());
    }

    let backend: Arc<dyn TracingBackend> = match &config.backend {
        BackendConfig::Recording { stdout } => {
            let exporter: Arc<dyn SpanExporter> = if *stdout {
                Arc::new(StdoutExporter::new(
                    config.service_name.clone(),
                    config.service_version.clone(),
                ))
            } else {
                Arc::new(NoOpExporter)
            };
            Arc::new(RecordingBackend::new(exporter))
        }
        BackendConfig::Otel(otel) => Arc::new(OtelBackend::install(
            &config.service_name,
            &config.service_version,
            otel,
        )?),
    };

    tracing::info!(
        service = %config.service_name,
        backend = ?backend,
        "Span recorder initialized"
    );

    Ok(SpanRecorder::new(backend)
        .with_service_name(config.service_name.clone())
        .with_failure_alert_threshold(config.failure_alert_threshold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BusinessContext;

    #[test]
    fn test_disabled_config_yields_noop_recorder() {
        let config = TracerConfig {
            enabled: false,
            ..TracerConfig::default()
        };
        let recorder = init_recorder(&config).unwrap();
        let span = recorder.start_root("op", &BusinessContext::new());
        assert!(span.context().is_valid());
        recorder.close(span);
        assert_eq!(recorder.backend_failure_count(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = TracerConfig {
            service_name: String::new(),
            ..TracerConfig::default()
        };
        assert!(matches!(
            init_recorder(&config),
            Err(BizctxError::ConfigurationError { .. })
        ));
    }

    #[tokio::test]
    async fn test_recording_config() {
        let config = TracerConfig {
            service_name: "card-service".to_string(),
            ..TracerConfig::default()
        };
        let recorder = init_recorder(&config).unwrap();
        let span = recorder.start_root("op", &BusinessContext::new().card_type("DEBIT"));
        recorder.close(span);
        recorder.flush().await.unwrap();
        assert_eq!(recorder.backend_failure_count(), 0);
    }
}
