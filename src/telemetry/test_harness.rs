//! Test harness for services instrumented with bizctx
//!
//! Pairs a [`SpanRecorder`] with an in-process [`RecordingBackend`] so tests
//! can run real service code and then inspect the finished spans.

use super::exporter::SpanData;
use super::recorder::SpanRecorder;
use super::recording::RecordingBackend;
use crate::context::keys;
use std::sync::Arc;

/// Recorder plus a view on the spans it finished
#[derive(Debug, Clone)]
pub struct TracingTestHarness {
    recorder: SpanRecorder,
    backend: RecordingBackend,
}

impl Default for TracingTestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TracingTestHarness {
    pub fn new() -> Self {
        let backend = RecordingBackend::default();
        let recorder = SpanRecorder::new(Arc::new(backend.clone()));
        Self { recorder, backend }
    }

    /// Harness whose root spans carry `business.service.name`
    pub fn for_service(service_name: &str) -> Self {
        let backend = RecordingBackend::default();
        let recorder =
            SpanRecorder::new(Arc::new(backend.clone())).with_service_name(service_name);
        Self { recorder, backend }
    }

    pub fn recorder(&self) -> &SpanRecorder {
        &self.recorder
    }

    /// Every span finished so far, in end order
    pub fn spans(&self) -> Vec<SpanData> {
        self.backend.finished_spans()
    }

    /// First finished span with this name
    pub fn span(&self, name: &str) -> Option<SpanData> {
        self.spans().into_iter().find(|s| s.name == name)
    }

    /// Finished spans tagged with the given correlation id
    pub fn spans_for_correlation(&self, correlation_id: &str) -> Vec<SpanData> {
        self.spans()
            .into_iter()
            .filter(|s| s.str_attr(keys::CORRELATION_ID) == Some(correlation_id))
            .collect()
    }

    /// Finished spans whose parent is `parent`
    pub fn children_of(&self, parent: &SpanData) -> Vec<SpanData> {
        self.spans()
            .into_iter()
            .filter(|s| s.parent_span_id.as_deref() == Some(parent.span_id.as_str()))
            .collect()
    }
}
