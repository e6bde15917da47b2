//! Tracer that buffers spans in memory and exports them on flush.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Span, SpanRecorder, SpanType, TRACING_TARGET, TraceOptions, TraceScope, Tracer};
use crate::Result;

/// Spans of one trace, as sent to the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanBatch {
    /// Trace identifier.
    pub trace_id: String,
    /// Trace metadata.
    pub metadata: BTreeMap<String, String>,
    /// Spans recorded since the previous flush.
    pub spans: Vec<Span>,
}

/// Destination of flushed span batches.
#[async_trait]
pub trait SpanExporter: Send + Sync {
    /// Sends one batch, authenticated with the given API key.
    async fn export(&self, batch: SpanBatch, api_key: &str) -> Result<()>;
}

/// Tracer that buffers spans per scope and exports them on flush.
///
/// Empty batches are not exported, and nothing is exported without an API
/// key. Spans still open at flush time are closed with the flush time.
#[derive(Clone)]
pub struct BufferedTracer {
    exporter: Arc<dyn SpanExporter>,
}

impl BufferedTracer {
    /// Creates a tracer exporting through the given exporter.
    pub fn new(exporter: Arc<dyn SpanExporter>) -> Self {
        Self { exporter }
    }
}

impl fmt::Debug for BufferedTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedTracer").finish_non_exhaustive()
    }
}

impl Tracer for BufferedTracer {
    fn open(&self, options: TraceOptions) -> Result<Box<dyn TraceScope>> {
        let root = (!options.skip_root_span).then(|| Span::start(SpanType::Span, "workflow"));
        let buffer = Arc::new(SpanBuffer {
            root_id: root.as_ref().map(|s| s.span_id.clone()),
            spans: Mutex::new(Vec::new()),
        });

        tracing::debug!(
            target: TRACING_TARGET,
            trace_id = %options.trace_id,
            skip_root_span = options.skip_root_span,
            "Trace scope opened"
        );

        Ok(Box::new(BufferedScope {
            options,
            root,
            buffer,
            autotracking: false,
            exporter: self.exporter.clone(),
        }))
    }
}

#[derive(Debug)]
struct SpanBuffer {
    root_id: Option<String>,
    spans: Mutex<Vec<Span>>,
}

impl SpanBuffer {
    fn drain(&self) -> Vec<Span> {
        let mut spans = self.spans.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *spans)
    }
}

impl SpanRecorder for SpanBuffer {
    fn record(&self, mut span: Span) {
        if span.parent_id.is_none() {
            span.parent_id = self.root_id.clone();
        }
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(span);
    }
}

struct BufferedScope {
    options: TraceOptions,
    root: Option<Span>,
    buffer: Arc<SpanBuffer>,
    autotracking: bool,
    exporter: Arc<dyn SpanExporter>,
}

#[async_trait]
impl TraceScope for BufferedScope {
    fn trace_id(&self) -> &str {
        &self.options.trace_id
    }

    fn autotrack_pipeline_calls(&mut self) -> Arc<dyn SpanRecorder> {
        self.autotracking = true;
        self.buffer.clone()
    }

    async fn flush(&mut self) -> Result<()> {
        let mut spans = self.buffer.drain();
        if let Some(mut root) = self.root.take() {
            root.finish();
            spans.insert(0, root);
        }
        spans.iter_mut().for_each(Span::finish);

        if spans.is_empty() {
            tracing::debug!(
                target: TRACING_TARGET,
                trace_id = %self.options.trace_id,
                autotracking = self.autotracking,
                "No spans to send"
            );
            return Ok(());
        }

        if self.options.api_key.is_empty() {
            tracing::warn!(
                target: TRACING_TARGET,
                trace_id = %self.options.trace_id,
                dropped = spans.len(),
                "API key is not set, spans will not be sent"
            );
            return Ok(());
        }

        let batch = SpanBatch {
            trace_id: self.options.trace_id.clone(),
            metadata: self.options.metadata.clone(),
            spans,
        };

        tracing::debug!(
            target: TRACING_TARGET,
            trace_id = %batch.trace_id,
            span_count = batch.spans.len(),
            "Sending spans"
        );

        self.exporter.export(batch, &self.options.api_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSpanExporter;

    fn options(skip_root_span: bool) -> TraceOptions {
        TraceOptions::new("trace_1", "key")
            .with_metadata("platform", "studio")
            .with_skip_root_span(skip_root_span)
    }

    #[tokio::test]
    async fn test_flush_exports_recorded_spans() {
        let exporter = Arc::new(MockSpanExporter::default());
        let tracer = BufferedTracer::new(exporter.clone());

        let mut scope = tracer.open(options(true)).unwrap();
        let recorder = scope.autotrack_pipeline_calls();
        recorder.record(Span::start(SpanType::Llm, "Predict"));
        scope.flush().await.unwrap();

        let batches = exporter.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].trace_id, "trace_1");
        assert_eq!(batches[0].metadata.get("platform").map(String::as_str), Some("studio"));
        assert_eq!(batches[0].spans.len(), 1);
        assert!(batches[0].spans[0].is_finished());
        assert!(batches[0].spans[0].parent_id.is_none());
    }

    #[tokio::test]
    async fn test_empty_flush_is_skipped() {
        let exporter = Arc::new(MockSpanExporter::default());
        let tracer = BufferedTracer::new(exporter.clone());

        let mut scope = tracer.open(options(true)).unwrap();
        scope.flush().await.unwrap();

        assert!(exporter.batches().is_empty());
    }

    #[tokio::test]
    async fn test_root_span_parents_recorded_spans() {
        let exporter = Arc::new(MockSpanExporter::default());
        let tracer = BufferedTracer::new(exporter.clone());

        let mut scope = tracer.open(options(false)).unwrap();
        let recorder = scope.autotrack_pipeline_calls();
        recorder.record(Span::start(SpanType::Rag, "ContextsRetriever"));
        scope.flush().await.unwrap();

        let spans = &exporter.batches()[0].spans;
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].parent_id.as_ref(), Some(&spans[0].span_id));
    }

    #[tokio::test]
    async fn test_missing_api_key_drops_spans() {
        let exporter = Arc::new(MockSpanExporter::default());
        let tracer = BufferedTracer::new(exporter.clone());

        let mut scope = tracer
            .open(TraceOptions::new("trace_1", "").with_skip_root_span(true))
            .unwrap();
        scope
            .autotrack_pipeline_calls()
            .record(Span::start(SpanType::Llm, "Predict"));
        scope.flush().await.unwrap();

        assert!(exporter.batches().is_empty());
    }
}
