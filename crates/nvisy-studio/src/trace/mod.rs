//! Trace scopes around node executions.
//!
//! A [`Tracer`] opens one [`TraceScope`] per execution. While the scope is
//! autotracking, compiled modules record [`Span`]s into the scope's
//! [`SpanRecorder`]; the orchestrator flushes the scope exactly once when the
//! execution ends, whatever the outcome.
//!
//! - [`NoopTracer`]: satisfies the shape without side effects
//! - [`BufferedTracer`]: buffers spans and hands them to a [`SpanExporter`]
//! - [`TraceGuard`]: distinguishes "no scope opened" from an open scope

mod buffered;
mod guard;
mod noop;
mod span;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
pub use buffered::{BufferedTracer, SpanBatch, SpanExporter};
pub use guard::TraceGuard;
pub use noop::NoopTracer;
pub use span::{Span, SpanMetrics, SpanTimestamps, SpanType};

use crate::Result;

/// Tracing target for trace scope operations.
const TRACING_TARGET: &str = "nvisy_studio::trace";

/// Options used to open a trace scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceOptions {
    /// Trace identifier shared with the client.
    pub trace_id: String,
    /// API key the spans are sent with.
    pub api_key: String,
    /// Free-form metadata attached to the trace.
    pub metadata: BTreeMap<String, String>,
    /// When set, the scope does not create a root span; the caller owns it.
    pub skip_root_span: bool,
}

impl TraceOptions {
    /// Creates options for the given trace.
    pub fn new(trace_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Sets whether the root span is skipped.
    #[must_use]
    pub fn with_skip_root_span(mut self, skip_root_span: bool) -> Self {
        self.skip_root_span = skip_root_span;
        self
    }
}

/// Sink compiled modules record spans into.
pub trait SpanRecorder: fmt::Debug + Send + Sync {
    /// Records a finished (or abandoned) span.
    fn record(&self, span: Span);
}

/// Opens trace scopes.
pub trait Tracer: Send + Sync {
    /// Opens a scope for one execution.
    fn open(&self, options: TraceOptions) -> Result<Box<dyn TraceScope>>;
}

/// One open trace.
#[async_trait]
pub trait TraceScope: Send + Sync {
    /// Returns the trace identifier.
    fn trace_id(&self) -> &str;

    /// Starts instrumenting pipeline calls and returns the recorder modules
    /// report their spans to.
    fn autotrack_pipeline_calls(&mut self) -> Arc<dyn SpanRecorder>;

    /// Sends the spans accumulated so far.
    async fn flush(&mut self) -> Result<()>;
}
