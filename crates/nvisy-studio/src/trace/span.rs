//! Span records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display};
use uuid::Uuid;

use crate::definition::now_millis;

/// Kind of work a span covers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SpanType {
    /// Generic span.
    #[default]
    Span,
    /// Language model call.
    Llm,
    /// Retrieval call.
    Rag,
    /// Compiled module call.
    Module,
    /// Evaluation call.
    Evaluation,
}

/// Span start and finish times in epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanTimestamps {
    /// When the span started.
    pub started_at: i64,
    /// When the span finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
}

/// Usage and cost figures of a span.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpanMetrics {
    /// Prompt tokens consumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    /// Completion tokens produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    /// Cost of the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// One recorded unit of work within a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Span identifier.
    pub span_id: String,
    /// Parent span, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Kind of work.
    #[serde(rename = "type")]
    pub span_type: SpanType,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Model used, for `llm` spans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Call input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// Call output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Retrieved contexts, for `rag` spans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contexts: Option<Vec<Value>>,
    /// Error message if the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Usage figures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<SpanMetrics>,
    /// Start and finish times.
    pub timestamps: SpanTimestamps,
}

impl Span {
    /// Starts a new span now.
    pub fn start(span_type: SpanType, name: impl Into<String>) -> Self {
        Self {
            span_id: format!("span_{}", Uuid::now_v7().simple()),
            parent_id: None,
            span_type,
            name: Some(name.into()),
            model: None,
            input: None,
            output: None,
            contexts: None,
            error: None,
            metrics: None,
            timestamps: SpanTimestamps {
                started_at: now_millis(),
                finished_at: None,
            },
        }
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the input.
    #[must_use]
    pub fn with_input(mut self, input: impl Into<Value>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Sets the parent span.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Marks the span finished now, if it is not already.
    pub fn finish(&mut self) {
        if self.timestamps.finished_at.is_none() {
            self.timestamps.finished_at = Some(now_millis());
        }
    }

    /// Returns whether the span has a finish time.
    pub fn is_finished(&self) -> bool {
        self.timestamps.finished_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_lifecycle() {
        let mut span = Span::start(SpanType::Llm, "Predict").with_model("gpt-4o");
        assert!(span.span_id.starts_with("span_"));
        assert!(!span.is_finished());

        span.finish();
        let finished_at = span.timestamps.finished_at;
        span.finish();
        assert_eq!(span.timestamps.finished_at, finished_at);

        let value = serde_json::to_value(&span).unwrap();
        assert_eq!(value["type"], "llm");
    }
}
