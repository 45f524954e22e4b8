//! Finished-span data and the sinks it is exported to
//!
//! The recording backend queues ended spans as [`SpanData`] and hands them
//! to a [`SpanExporter`] in one batch per [`crate::SpanRecorder::flush`].
//! The sinks here cover local development and tests; production services
//! run the OpenTelemetry backend instead.

use crate::context::AttributeValue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Failure writing a span batch to its sink
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to write span batch: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode span batch: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A span after it has ended, as seen by exporters and test assertions
#[derive(Debug, Clone)]
pub struct SpanData {
    /// 32 hex characters
    pub trace_id: String,
    /// 16 hex characters
    pub span_id: String,
    /// `None` for a request root
    pub parent_span_id: Option<String>,
    /// e.g. "CardService.issueCard" or "Card.find_by_number"
    pub name: String,
    pub kind: SpanKind,
    pub start_time_unix_nano: u64,
    pub end_time_unix_nano: u64,
    pub attributes: HashMap<String, AttributeValue>,
    pub status: SpanStatus,
    pub events: Vec<SpanEvent>,
}

impl SpanData {
    /// Borrow a string attribute
    pub fn str_attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }

    /// Events with the given name
    pub fn events_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SpanEvent> {
        self.events.iter().filter(move |e| e.name == name)
    }
}

/// Where a span sits relative to the service boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    /// Service and persistence work inside a request
    Internal,
    /// Outbound call to another service
    Client,
    /// Inbound request handled by this service
    Server,
}

/// Final outcome recorded on a span
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanStatus {
    /// Ended without an outcome, e.g. unwound by a panic
    Unset,
    Ok,
    Error { message: String },
}

/// Point-in-time occurrence recorded on a span, such as `card.issued`
#[derive(Debug, Clone)]
pub struct SpanEvent {
    pub name: String,
    pub time_unix_nano: u64,
    pub attributes: HashMap<String, AttributeValue>,
}

/// Sink for batches of finished spans
///
/// Exporters run on the flush path only, never while business code is
/// waiting on a span. A failed export is reported to the flush caller.
///
/// ```ignore
/// use bizctx::telemetry::exporter::{ExportError, SpanData, SpanExporter};
/// use tokio::sync::mpsc;
///
/// #[derive(Debug)]
/// struct AuditForwarder(mpsc::UnboundedSender<SpanData>);
///
/// #[async_trait::async_trait]
/// impl SpanExporter for AuditForwarder {
///     async fn export(&self, spans: Vec<SpanData>) -> Result<(), ExportError> {
///         for span in spans.into_iter().filter(|s| s.name.starts_with("Card.")) {
///             let _ = self.0.send(span);
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait SpanExporter: Send + Sync + std::fmt::Debug {
    async fn export(&self, spans: Vec<SpanData>) -> Result<(), ExportError>;
}

/// Drops every batch; used when tracing is disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpExporter;

#[async_trait]
impl SpanExporter for NoOpExporter {
    async fn export(&self, _spans: Vec<SpanData>) -> Result<(), ExportError> {
        Ok(())
    }
}

/// Accumulates exported spans for later inspection
#[derive(Debug, Clone, Default)]
pub struct InMemoryExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl InMemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All spans exported so far
    pub fn spans(&self) -> Vec<SpanData> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SpanExporter for InMemoryExporter {
    async fn export(&self, spans: Vec<SpanData>) -> Result<(), ExportError> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(spans);
        Ok(())
    }
}

/// Prints each batch to stdout as a single line of OTLP JSON
#[derive(Debug, Clone)]
pub struct StdoutExporter {
    service_name: String,
    service_version: String,
}

impl StdoutExporter {
    pub fn new(service_name: impl Into<String>, service_version: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: service_version.into(),
        }
    }
}

#[async_trait]
impl SpanExporter for StdoutExporter {
    async fn export(&self, spans: Vec<SpanData>) -> Result<(), ExportError> {
        if spans.is_empty() {
            return Ok(());
        }
        let mut line = otlp::serialize_spans(&spans, &self.service_name, &self.service_version)?;
        line.push(b'\n');

        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&line)?;
        stdout.flush()?;
        Ok(())
    }
}

/// OTLP/JSON encoding of span batches
///
/// Produces the `ExportTraceServiceRequest` document described at
/// <https://opentelemetry.io/docs/specs/otlp/#json-protobuf-encoding>, so the
/// output can be replayed into any collector's HTTP/JSON receiver.
pub mod otlp {
    use super::{ExportError, SpanData, SpanEvent, SpanKind, SpanStatus};
    use crate::context::AttributeValue;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    /// Instrumentation scope name reported for every span
    pub const SCOPE_NAME: &str = "bizctx";

    fn any_value(value: &AttributeValue) -> Value {
        match value {
            AttributeValue::String(s) => json!({ "stringValue": s }),
            AttributeValue::Bool(b) => json!({ "boolValue": b }),
            // int64 travels as a string in OTLP JSON
            AttributeValue::Int(i) => json!({ "intValue": i.to_string() }),
            AttributeValue::Float(f) => json!({ "doubleValue": f }),
        }
    }

    fn key_values(attributes: &HashMap<String, AttributeValue>) -> Vec<Value> {
        let mut keys: Vec<&String> = attributes.keys().collect();
        keys.sort();
        keys.into_iter()
            .map(|key| json!({ "key": key, "value": any_value(&attributes[key]) }))
            .collect()
    }

    fn kind_code(kind: SpanKind) -> u32 {
        match kind {
            SpanKind::Internal => 1,
            SpanKind::Server => 2,
            SpanKind::Client => 3,
        }
    }

    fn status(status: &SpanStatus) -> Value {
        match status {
            SpanStatus::Unset => json!({ "code": 0 }),
            SpanStatus::Ok => json!({ "code": 1 }),
            SpanStatus::Error { message } => json!({ "code": 2, "message": message }),
        }
    }

    fn event(event: &SpanEvent) -> Value {
        json!({
            "name": event.name,
            "timeUnixNano": event.time_unix_nano.to_string(),
            "attributes": key_values(&event.attributes),
        })
    }

    fn span(span: &SpanData) -> Value {
        let mut encoded = json!({
            "traceId": span.trace_id,
            "spanId": span.span_id,
            "name": span.name,
            "kind": kind_code(span.kind),
            "startTimeUnixNano": span.start_time_unix_nano.to_string(),
            "endTimeUnixNano": span.end_time_unix_nano.to_string(),
            "attributes": key_values(&span.attributes),
            "status": status(&span.status),
        });
        if let Some(parent) = &span.parent_span_id {
            encoded["parentSpanId"] = json!(parent);
        }
        if !span.events.is_empty() {
            encoded["events"] = span.events.iter().map(event).collect();
        }
        encoded
    }

    /// Encode one batch as a single-resource OTLP request
    ///
    /// `service_name` and `service_version` become the `service.name` and
    /// `service.version` resource attributes. Span and event attributes are
    /// emitted sorted by key.
    pub fn serialize_spans(
        spans: &[SpanData],
        service_name: &str,
        service_version: &str,
    ) -> Result<Vec<u8>, ExportError> {
        let resource = [
            ("service.name", service_name),
            ("service.version", service_version),
            ("telemetry.sdk.name", SCOPE_NAME),
        ]
        .map(|(key, value)| json!({ "key": key, "value": { "stringValue": value } }));

        let request = json!({
            "resourceSpans": [{
                "resource": { "attributes": resource },
                "scopeSpans": [{
                    "scope": { "name": SCOPE_NAME, "version": env!("CARGO_PKG_VERSION") },
                    "spans": spans.iter().map(span).collect::<Vec<_>>(),
                }],
            }],
        });
        Ok(serde_json::to_vec(&request)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_span() -> SpanData {
        let mut attributes = HashMap::new();
        attributes.insert(
            "business.card.number".to_string(),
            AttributeValue::String("************1111".to_string()),
        );
        attributes.insert(
            "persistence.batch_size".to_string(),
            AttributeValue::Int(3),
        );
        attributes.insert(
            "business.operation.success".to_string(),
            AttributeValue::Bool(false),
        );

        SpanData {
            trace_id: "0123456789abcdef0123456789abcdef".to_string(),
            span_id: "fedcba9876543210".to_string(),
            parent_span_id: Some("abcdef0123456789".to_string()),
            name: "CardService.blockCard".to_string(),
            kind: SpanKind::Internal,
            start_time_unix_nano: 1_000_000_000,
            end_time_unix_nano: 2_000_000_000,
            attributes,
            status: SpanStatus::Error {
                message: "card not found".to_string(),
            },
            events: vec![SpanEvent {
                name: "exception".to_string(),
                time_unix_nano: 1_500_000_000,
                attributes: HashMap::new(),
            }],
        }
    }

    #[test]
    fn test_otlp_serialize_spans() {
        let bytes = otlp::serialize_spans(&[sample_span()], "card-service", "1.2.0").unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        let resource_attrs = &json["resourceSpans"][0]["resource"]["attributes"];
        assert_eq!(resource_attrs[0]["key"], "service.name");
        assert_eq!(resource_attrs[0]["value"]["stringValue"], "card-service");

        let span = &json["resourceSpans"][0]["scopeSpans"][0]["spans"][0];
        assert_eq!(span["traceId"], "0123456789abcdef0123456789abcdef");
        assert_eq!(span["parentSpanId"], "abcdef0123456789");
        assert_eq!(span["kind"], 1);
        assert_eq!(span["startTimeUnixNano"], "1000000000");
        assert_eq!(span["status"]["code"], 2);
        assert_eq!(span["status"]["message"], "card not found");
        assert_eq!(span["events"][0]["name"], "exception");

        // attributes are emitted sorted by key
        let attrs = span["attributes"].as_array().unwrap();
        assert_eq!(attrs[0]["key"], "business.card.number");
        assert_eq!(attrs[1]["value"]["boolValue"], false);
        assert_eq!(attrs[2]["value"]["intValue"], "3");
    }

    #[test]
    fn test_root_span_omits_parent() {
        let mut span = sample_span();
        span.parent_span_id = None;
        span.events.clear();

        let bytes = otlp::serialize_spans(&[span], "svc", "0.1.0").unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains("parentSpanId"));
        assert!(!text.contains("\"events\""));
    }

    #[tokio::test]
    async fn test_in_memory_exporter_collects_batches() {
        let exporter = InMemoryExporter::new();
        exporter.export(vec![sample_span()]).await.unwrap();
        exporter.export(vec![sample_span(), sample_span()]).await.unwrap();

        assert_eq!(exporter.spans().len(), 3);
    }

    #[tokio::test]
    async fn test_noop_exporter() {
        let exporter = NoOpExporter;
        assert!(exporter.export(vec![sample_span()]).await.is_ok());
    }

    #[test]
    fn test_span_data_helpers() {
        let span = sample_span();
        assert_eq!(span.str_attr("business.card.number"), Some("************1111"));
        assert_eq!(span.events_named("exception").count(), 1);
    }
}
