//! Per-invocation context handed to compiled modules.

use std::sync::Arc;

use derive_builder::Builder;
use tokio_util::sync::CancellationToken;

use crate::trace::{Span, SpanRecorder};

/// Backend behavior toggles for one invocation.
///
/// These travel with the invocation instead of living in process-wide state,
/// so concurrent executions cannot change each other's settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationSettings {
    /// Whether backends may serve cached results.
    pub cache_enabled: bool,
    /// Whether experimental backend features are enabled.
    pub experimental: bool,
}

impl InvocationSettings {
    /// Settings for a manually triggered run: no caching, experimental
    /// features on.
    pub const fn fresh() -> Self {
        Self {
            cache_enabled: false,
            experimental: true,
        }
    }
}

impl Default for InvocationSettings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            experimental: false,
        }
    }
}

/// Context of one module invocation.
#[derive(Debug, Clone, Builder)]
#[builder(pattern = "owned", setter(into, strip_option, prefix = "with"))]
pub struct InvocationContext {
    /// Trace the invocation belongs to.
    trace_id: String,
    /// Backend toggles.
    #[builder(default)]
    settings: InvocationSettings,
    /// Span sink, present while the trace is autotracking.
    #[builder(default)]
    spans: Option<Arc<dyn SpanRecorder>>,
    /// Cancellation signal of the execution.
    #[builder(default)]
    cancel: CancellationToken,
}

impl InvocationContext {
    /// Creates a context with default settings and no span sink.
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            settings: InvocationSettings::default(),
            spans: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Returns a builder for creating a context.
    pub fn builder() -> InvocationContextBuilder {
        InvocationContextBuilder::default()
    }

    /// Returns the trace identifier.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Returns the backend toggles.
    pub fn settings(&self) -> &InvocationSettings {
        &self.settings
    }

    /// Returns whether modules should record spans.
    pub fn is_tracing(&self) -> bool {
        self.spans.is_some()
    }

    /// Records a span if the trace is autotracking.
    pub fn record(&self, span: Span) {
        if let Some(spans) = &self.spans {
            spans.record(span);
        }
    }

    /// Returns the cancellation signal.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSpanRecorder;
    use crate::trace::SpanType;

    #[test]
    fn test_builder_defaults() {
        let ctx = InvocationContext::builder()
            .with_trace_id("trace_1")
            .build()
            .unwrap();

        assert_eq!(ctx.trace_id(), "trace_1");
        assert!(ctx.settings().cache_enabled);
        assert!(!ctx.is_tracing());
        ctx.record(Span::start(SpanType::Llm, "ignored"));
    }

    #[test]
    fn test_records_into_sink() {
        let recorder = Arc::new(MockSpanRecorder::default());
        let sink: Arc<dyn SpanRecorder> = recorder.clone();
        let ctx = InvocationContext::builder()
            .with_trace_id("trace_1")
            .with_settings(InvocationSettings::fresh())
            .with_spans(sink)
            .build()
            .unwrap();

        ctx.record(Span::start(SpanType::Llm, "Predict"));
        assert!(!ctx.settings().cache_enabled);
        assert_eq!(recorder.spans().len(), 1);
    }
}
