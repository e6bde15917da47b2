//! Retrieval wrapper module.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{InvocationContext, Inputs, Module, Outputs, Prediction};
use crate::definition::Settings;
use crate::provider::RetrieverBackend;
use crate::trace::{Span, SpanType};
use crate::{Error, Result};

/// Output key the retrieved passages are returned under.
pub const CONTEXTS_KEY: &str = "contexts";

/// Number of passages fetched when the node does not configure `k`.
pub const DEFAULT_K: usize = 3;

const QUERY_KEY: &str = "query";

/// Fetches the top-`k` passages for a query from a retrieval backend.
#[derive(Debug, Clone)]
pub struct ContextsRetriever {
    name: String,
    backend: Arc<dyn RetrieverBackend>,
    k: usize,
}

impl ContextsRetriever {
    /// Creates a retriever over `backend`, taking `k` from the settings.
    pub fn new(name: impl Into<String>, backend: Arc<dyn RetrieverBackend>, settings: &Settings) -> Self {
        Self {
            name: name.into(),
            backend,
            k: settings.get_usize("k").unwrap_or(DEFAULT_K),
        }
    }

    /// Returns the number of passages fetched per query.
    pub fn k(&self) -> usize {
        self.k
    }

    fn query(inputs: &Inputs) -> Result<String> {
        let value = match inputs.get(QUERY_KEY) {
            Some(value) => value,
            None if inputs.len() == 1 => inputs.values().next().unwrap_or(&Value::Null),
            None => {
                return Err(Error::invocation(format!(
                    "retriever expects a '{QUERY_KEY}' input"
                )));
            }
        };

        match value {
            Value::String(query) => Ok(query.clone()),
            Value::Null => Err(Error::invocation("retriever query is empty")),
            other => Ok(other.to_string()),
        }
    }
}

#[async_trait]
impl Module for ContextsRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    async fn forward(&self, ctx: &InvocationContext, inputs: Inputs) -> Result<Prediction> {
        let query = Self::query(&inputs)?;
        let result = self.backend.retrieve(&query, self.k, ctx.settings()).await;

        if ctx.is_tracing() {
            let mut span = Span::start(SpanType::Rag, self.name()).with_input(query);
            match &result {
                Ok(passages) => {
                    span.contexts = Some(
                        passages
                            .iter()
                            .map(|p| Value::String(p.content.clone()))
                            .collect(),
                    );
                }
                Err(err) => span.error = Some(err.to_string()),
            }
            span.finish();
            ctx.record(span);
        }

        let contexts = result?
            .into_iter()
            .map(|passage| Value::String(passage.content))
            .collect();

        let mut outputs = Outputs::new();
        outputs.insert(CONTEXTS_KEY.to_owned(), Value::Array(contexts));
        Ok(Prediction::new(outputs))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::mock::MockRetriever;

    fn settings(k: usize) -> Settings {
        let mut settings = Settings::default();
        settings.insert("k".into(), json!(k));
        settings
    }

    #[tokio::test]
    async fn test_returns_contexts() {
        let backend = Arc::new(MockRetriever::new(["alpha", "beta", "gamma", "delta"]));
        let retriever = ContextsRetriever::new("ColBERTv2", backend, &settings(2));

        let mut inputs = Inputs::new();
        inputs.insert("query".into(), json!("letters"));
        let prediction = retriever
            .forward(&InvocationContext::new("trace_1"), inputs)
            .await
            .unwrap();

        assert_eq!(prediction.outputs()[CONTEXTS_KEY], json!(["alpha", "beta"]));
        assert!(prediction.as_cost().is_none());
    }

    #[tokio::test]
    async fn test_single_input_is_the_query() {
        let backend = Arc::new(MockRetriever::default());
        let retriever = ContextsRetriever::new("ColBERTv2", backend, &Settings::default());
        assert_eq!(retriever.k(), DEFAULT_K);

        let mut inputs = Inputs::new();
        inputs.insert("question".into(), json!("anything"));
        let prediction = retriever
            .forward(&InvocationContext::new("trace_1"), inputs)
            .await
            .unwrap();
        assert!(prediction.outputs()[CONTEXTS_KEY].is_array());
    }

    #[tokio::test]
    async fn test_ambiguous_query_fails() {
        let retriever =
            ContextsRetriever::new("ColBERTv2", Arc::new(MockRetriever::default()), &Settings::default());

        let mut inputs = Inputs::new();
        inputs.insert("a".into(), json!("x"));
        inputs.insert("b".into(), json!("y"));
        let err = retriever
            .forward(&InvocationContext::new("trace_1"), inputs)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Invocation(_)));
    }
}
