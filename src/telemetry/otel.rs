//! OpenTelemetry backend
//!
//! [`OtelBackend::install`] builds an SDK tracer provider with batch span
//! processors (OTLP over gRPC or HTTP, and optionally stdout), installs it as
//! the global provider and returns a backend that opens spans through it.
//! Parent linkage is carried explicitly from our [`SpanContext`] rather than
//! through the OpenTelemetry thread-local context.

use super::backend::{BackendError, BackendSpan, SpanContext, TracingBackend};
use super::exporter::{SpanKind, SpanStatus};
use crate::config::{OtelConfig, OtlpProtocol};
use crate::context::{keys, AttributeValue, Projection};
use crate::error::BizctxError;
use async_trait::async_trait;
use opentelemetry::{
    global,
    trace::{
        Span as _, SpanContext as OtelSpanContext, SpanId, Status, TraceContextExt, TraceFlags,
        TraceId, TraceState, Tracer as _,
    },
    Context, KeyValue, Value,
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{trace::TracerProvider, Resource};
use tracing::info;

/// Instrumentation scope name of every span
pub const TRACER_NAME: &str = "bizctx";

fn to_value(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::String(s) => Value::from(s.clone()),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Int(i) => Value::I64(*i),
        AttributeValue::Float(f) => Value::F64(*f),
    }
}

fn to_key_values(attributes: &Projection) -> Vec<KeyValue> {
    attributes
        .iter()
        .map(|attr| KeyValue::new(attr.key.clone(), to_value(&attr.value)))
        .collect()
}

fn to_otel_kind(kind: SpanKind) -> opentelemetry::trace::SpanKind {
    match kind {
        SpanKind::Internal => opentelemetry::trace::SpanKind::Internal,
        SpanKind::Client => opentelemetry::trace::SpanKind::Client,
        SpanKind::Server => opentelemetry::trace::SpanKind::Server,
    }
}

fn parent_context(parent: &SpanContext) -> Result<Context, BackendError> {
    let trace_id = TraceId::from_hex(&parent.trace_id)
        .map_err(|e| BackendError::Other(format!("invalid parent trace id: {}", e)))?;
    let span_id = SpanId::from_hex(&parent.span_id)
        .map_err(|e| BackendError::Other(format!("invalid parent span id: {}", e)))?;
    let span_context = OtelSpanContext::new(
        trace_id,
        span_id,
        TraceFlags::SAMPLED,
        true,
        TraceState::default(),
    );
    Ok(Context::new().with_remote_span_context(span_context))
}

/// Backend that records through the global OpenTelemetry tracer
#[derive(Debug, Clone)]
pub struct OtelBackend {
    provider: Option<TracerProvider>,
}

impl OtelBackend {
    /// Use whatever global tracer provider the application installed
    pub fn from_global() -> Self {
        Self { provider: None }
    }

    /// Build and install the global tracer provider
    ///
    /// Must be called from within a tokio runtime.
    pub fn install(
        service_name: &str,
        service_version: &str,
        config: &OtelConfig,
    ) -> Result<Self, BizctxError> {
        let mut resource_attrs = vec![
            KeyValue::new("service.name", service_name.to_string()),
            KeyValue::new("service.version", service_version.to_string()),
            KeyValue::new("telemetry.sdk.name", TRACER_NAME),
        ];
        for (key, value) in &config.resource_attributes {
            resource_attrs.push(KeyValue::new(key.clone(), value.clone()));
        }

        let trace_config =
            opentelemetry_sdk::trace::Config::default().with_resource(Resource::new(resource_attrs));
        let mut builder = TracerProvider::builder().with_config(trace_config);

        if let Some(endpoint) = &config.endpoint {
            let exporter = match config.protocol {
                OtlpProtocol::Http => {
                    let http_endpoint = if endpoint.ends_with("/v1/traces") {
                        endpoint.clone()
                    } else {
                        format!("{}/v1/traces", endpoint.trim_end_matches('/'))
                    };
                    info!("Using HTTP protocol for OTLP traces (endpoint: {})", http_endpoint);
                    opentelemetry_otlp::new_exporter()
                        .http()
                        .with_endpoint(http_endpoint)
                        .with_timeout(config.export_timeout)
                        .build_span_exporter()
                }
                OtlpProtocol::Grpc => {
                    info!("Using gRPC protocol for OTLP traces (endpoint: {})", endpoint);
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint.clone())
                        .with_timeout(config.export_timeout)
                        .build_span_exporter()
                }
            }
            .map_err(|e| {
                BizctxError::backend_error(format!("Failed to build OTLP exporter: {}", e))
            })?;

            let processor = opentelemetry_sdk::trace::BatchSpanProcessor::builder(
                exporter,
                opentelemetry_sdk::runtime::Tokio,
            )
            .build();
            builder = builder.with_span_processor(processor);
        }

        if config.console_export {
            info!("Enabling console span exporter");
            let console_processor = opentelemetry_sdk::trace::BatchSpanProcessor::builder(
                opentelemetry_stdout::SpanExporter::default(),
                opentelemetry_sdk::runtime::Tokio,
            )
            .build();
            builder = builder.with_span_processor(console_processor);
        }

        let provider = builder.build();
        global::set_tracer_provider(provider.clone());
        info!(service = service_name, "OpenTelemetry tracer provider installed");

        Ok(Self {
            provider: Some(provider),
        })
    }

    /// Flush and shut down the global tracer provider
    pub fn shutdown(&self) {
        global::shutdown_tracer_provider();
    }
}

#[async_trait]
impl TracingBackend for OtelBackend {
    fn start_span(
        &self,
        name: &str,
        kind: SpanKind,
        parent: Option<&SpanContext>,
        attributes: &Projection,
    ) -> Result<Box<dyn BackendSpan>, BackendError> {
        let cx = match parent {
            Some(parent) => parent_context(parent)?,
            None => Context::new(),
        };

        let tracer = global::tracer(TRACER_NAME);
        let span = tracer
            .span_builder(name.to_string())
            .with_kind(to_otel_kind(kind))
            .with_attributes(to_key_values(attributes))
            .start_with_context(&tracer, &cx);

        let otel_context = span.span_context();
        let context = SpanContext {
            trace_id: otel_context.trace_id().to_string(),
            span_id: otel_context.span_id().to_string(),
            parent_span_id: parent.map(|p| p.span_id.clone()),
        };

        Ok(Box::new(OtelSpan {
            span,
            context,
            ended: false,
        }))
    }

    async fn flush(&self) -> Result<(), BackendError> {
        if let Some(provider) = &self.provider {
            for result in provider.force_flush() {
                result.map_err(|e| BackendError::Other(e.to_string()))?;
            }
        }
        Ok(())
    }
}

struct OtelSpan {
    span: global::BoxedSpan,
    context: SpanContext,
    ended: bool,
}

impl OtelSpan {
    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.ended {
            Err(BackendError::SpanEnded)
        } else {
            Ok(())
        }
    }
}

impl BackendSpan for OtelSpan {
    fn context(&self) -> &SpanContext {
        &self.context
    }

    fn set_attributes(&mut self, attributes: &Projection) -> Result<(), BackendError> {
        self.ensure_open()?;
        self.span.set_attributes(to_key_values(attributes));
        Ok(())
    }

    fn record_exception(&mut self, error_type: &str, message: &str) -> Result<(), BackendError> {
        self.ensure_open()?;
        self.span.add_event(
            keys::EXCEPTION_EVENT,
            vec![
                KeyValue::new(keys::EXCEPTION_TYPE, error_type.to_string()),
                KeyValue::new(keys::EXCEPTION_MESSAGE, message.to_string()),
            ],
        );
        Ok(())
    }

    fn add_event(&mut self, name: &str, attributes: &Projection) -> Result<(), BackendError> {
        self.ensure_open()?;
        self.span
            .add_event(name.to_string(), to_key_values(attributes));
        Ok(())
    }

    fn set_status(&mut self, status: SpanStatus) -> Result<(), BackendError> {
        self.ensure_open()?;
        let status = match status {
            SpanStatus::Unset => Status::Unset,
            SpanStatus::Ok => Status::Ok,
            SpanStatus::Error { message } => Status::error(message),
        };
        self.span.set_status(status);
        Ok(())
    }

    fn end(&mut self) -> Result<(), BackendError> {
        self.ensure_open()?;
        self.ended = true;
        self.span.end();
        Ok(())
    }
}
