//! In-process recording backend
//!
//! Spans are built up as [`SpanData`] while open. When ended they are
//! queued in memory and handed to the configured [`SpanExporter`] on the
//! next flush. Recording never blocks on I/O.

use super::backend::{
    generate_span_id, generate_trace_id, BackendError, BackendSpan, SpanContext, TracingBackend,
};
use super::exporter::{NoOpExporter, SpanData, SpanEvent, SpanExporter, SpanKind, SpanStatus};
use crate::context::{keys, AttributeValue, Projection};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Get current time in nanoseconds since Unix epoch
fn now_nanos() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or_default()
}

fn to_map(attributes: &Projection) -> HashMap<String, AttributeValue> {
    attributes
        .iter()
        .map(|attr| (attr.key.clone(), attr.value.clone()))
        .collect()
}

/// Backend that queues finished spans for a [`SpanExporter`]
#[derive(Debug, Clone)]
pub struct RecordingBackend {
    exporter: Arc<dyn SpanExporter>,
    /// Ended spans waiting to be exported
    pending_spans: Arc<Mutex<Vec<SpanData>>>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new(Arc::new(NoOpExporter))
    }
}

impl RecordingBackend {
    pub fn new(exporter: Arc<dyn SpanExporter>) -> Self {
        Self {
            exporter,
            pending_spans: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of ended spans that have not been flushed yet
    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.pending_spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of ended spans waiting for export
    pub fn pending_count(&self) -> usize {
        self.pending_spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn take_pending(&self) -> Vec<SpanData> {
        let mut pending = self
            .pending_spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *pending)
    }
}

#[async_trait]
impl TracingBackend for RecordingBackend {
    fn start_span(
        &self,
        name: &str,
        kind: SpanKind,
        parent: Option<&SpanContext>,
        attributes: &Projection,
    ) -> Result<Box<dyn BackendSpan>, BackendError> {
        let context = SpanContext {
            trace_id: parent
                .map(|p| p.trace_id.clone())
                .unwrap_or_else(generate_trace_id),
            span_id: generate_span_id(),
            parent_span_id: parent.map(|p| p.span_id.clone()),
        };

        let data = SpanData {
            trace_id: context.trace_id.clone(),
            span_id: context.span_id.clone(),
            parent_span_id: context.parent_span_id.clone(),
            name: name.to_string(),
            kind,
            start_time_unix_nano: now_nanos(),
            end_time_unix_nano: 0,
            attributes: to_map(attributes),
            status: SpanStatus::Unset,
            events: Vec::new(),
        };

        Ok(Box::new(RecordingSpan {
            data,
            context,
            pending_spans: Arc::clone(&self.pending_spans),
            finished: false,
        }))
    }

    async fn flush(&self) -> Result<(), BackendError> {
        let spans = self.take_pending();
        tracing::debug!("Flushing {} pending spans", spans.len());

        if spans.is_empty() {
            return Ok(());
        }
        self.exporter
            .export(spans)
            .await
            .map_err(|e| BackendError::Other(e.to_string()))
    }
}

/// Open span of a [`RecordingBackend`]
struct RecordingSpan {
    data: SpanData,
    context: SpanContext,
    pending_spans: Arc<Mutex<Vec<SpanData>>>,
    finished: bool,
}

impl RecordingSpan {
    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.finished {
            Err(BackendError::SpanEnded)
        } else {
            Ok(())
        }
    }
}

impl BackendSpan for RecordingSpan {
    fn context(&self) -> &SpanContext {
        &self.context
    }

    fn set_attributes(&mut self, attributes: &Projection) -> Result<(), BackendError> {
        self.ensure_open()?;
        for attr in attributes {
            self.data
                .attributes
                .insert(attr.key.clone(), attr.value.clone());
        }
        Ok(())
    }

    fn record_exception(&mut self, error_type: &str, message: &str) -> Result<(), BackendError> {
        self.ensure_open()?;
        let mut attributes = HashMap::new();
        attributes.insert(
            keys::EXCEPTION_TYPE.to_string(),
            AttributeValue::from(error_type),
        );
        attributes.insert(
            keys::EXCEPTION_MESSAGE.to_string(),
            AttributeValue::from(message),
        );
        self.data.events.push(SpanEvent {
            name: keys::EXCEPTION_EVENT.to_string(),
            time_unix_nano: now_nanos(),
            attributes,
        });
        Ok(())
    }

    fn add_event(&mut self, name: &str, attributes: &Projection) -> Result<(), BackendError> {
        self.ensure_open()?;
        self.data.events.push(SpanEvent {
            name: name.to_string(),
            time_unix_nano: now_nanos(),
            attributes: to_map(attributes),
        });
        Ok(())
    }

    fn set_status(&mut self, status: SpanStatus) -> Result<(), BackendError> {
        self.ensure_open()?;
        self.data.status = status;
        Ok(())
    }

    fn end(&mut self) -> Result<(), BackendError> {
        self.ensure_open()?;
        self.data.end_time_unix_nano = now_nanos();
        self.finished = true;

        // Queue for export
        self.pending_spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.data.clone());
        Ok(())
    }
}
