//! Hosted evaluator module.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{InvocationContext, Inputs, Module, Outputs, Prediction};
use crate::definition::Settings;
use crate::provider::{EvaluationClient, EvaluationRequest, EvaluationResult, EvaluationStatus};
use crate::trace::{Span, SpanMetrics, SpanType};
use crate::{Error, Result};

/// Evaluator class name that runs on the hosted evaluation service.
pub const HOSTED_EVALUATOR_CLASS: &str = "LangWatchEvaluator";

/// Runs one evaluator on the hosted evaluation service.
#[derive(Clone)]
pub struct HostedEvaluator {
    name: String,
    evaluator: String,
    api_key: String,
    settings: Settings,
    client: Arc<dyn EvaluationClient>,
}

impl HostedEvaluator {
    /// Creates a hosted evaluator module.
    pub fn new(
        client: Arc<dyn EvaluationClient>,
        api_key: impl Into<String>,
        evaluator: impl Into<String>,
        name: impl Into<String>,
        settings: Settings,
    ) -> Self {
        Self {
            name: name.into(),
            evaluator: evaluator.into(),
            api_key: api_key.into(),
            settings,
            client,
        }
    }

    /// Returns the evaluator identifier on the service.
    pub fn evaluator(&self) -> &str {
        &self.evaluator
    }

    /// Returns the evaluator settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

fn result_outputs(result: &EvaluationResult) -> Outputs {
    let mut outputs = Outputs::new();
    outputs.insert("status".into(), json!(result.status));
    if let Some(score) = result.score {
        outputs.insert("score".into(), json!(score));
    }
    if let Some(passed) = result.passed {
        outputs.insert("passed".into(), json!(passed));
    }
    if let Some(label) = &result.label {
        outputs.insert("label".into(), json!(label));
    }
    if let Some(details) = &result.details {
        outputs.insert("details".into(), json!(details));
    }
    outputs
}

#[async_trait]
impl Module for HostedEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn forward(&self, ctx: &InvocationContext, inputs: Inputs) -> Result<Prediction> {
        let span = ctx
            .is_tracing()
            .then(|| Span::start(SpanType::Evaluation, self.name()).with_input(Value::Object(inputs.clone())));

        let request = EvaluationRequest {
            evaluator: self.evaluator.clone(),
            name: self.name.clone(),
            settings: self.settings.clone(),
            data: inputs,
        };

        let result = self
            .client
            .evaluate(request, &self.api_key)
            .await
            .and_then(|result| match result.status {
                EvaluationStatus::Error => Err(Error::invocation(format!(
                    "evaluator {} failed: {}",
                    self.evaluator,
                    result.details.as_deref().unwrap_or("unknown error")
                ))),
                _ => Ok(result),
            });

        if let Some(mut span) = span {
            match &result {
                Ok(result) => {
                    span.output = Some(Value::Object(result_outputs(result)));
                    span.metrics = result.cost.as_ref().map(|cost| SpanMetrics {
                        cost: Some(cost.amount),
                        ..SpanMetrics::default()
                    });
                }
                Err(err) => span.error = Some(err.to_string()),
            }
            span.finish();
            ctx.record(span);
        }

        let result = result?;
        let prediction = Prediction::new(result_outputs(&result));
        Ok(match result.cost {
            Some(cost) => prediction.with_cost(cost.amount),
            None => prediction,
        })
    }
}

impl fmt::Debug for HostedEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedEvaluator")
            .field("name", &self.name)
            .field("evaluator", &self.evaluator)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEvaluationClient;
    use crate::provider::Money;

    fn evaluator(client: MockEvaluationClient) -> HostedEvaluator {
        HostedEvaluator::new(
            Arc::new(client),
            "sk-test",
            "ragas/faithfulness",
            "Faithfulness",
            Settings::default(),
        )
    }

    #[tokio::test]
    async fn test_processed_result_and_cost() {
        let client = MockEvaluationClient::new(EvaluationResult {
            status: EvaluationStatus::Processed,
            score: Some(0.8),
            passed: Some(true),
            label: None,
            details: None,
            cost: Some(Money {
                currency: "USD".into(),
                amount: 0.01,
            }),
        });
        let module = evaluator(client.clone());

        let mut inputs = Inputs::new();
        inputs.insert("output".into(), json!("Paris"));
        let prediction = module
            .forward(&InvocationContext::new("trace_1"), inputs)
            .await
            .unwrap();

        assert_eq!(prediction.outputs()["status"], json!("processed"));
        assert_eq!(prediction.outputs()["score"], json!(0.8));
        assert_eq!(prediction.as_cost().map(|c| c.cost()), Some(0.01));

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0.evaluator, "ragas/faithfulness");
        assert_eq!(requests[0].1, "sk-test");
    }

    #[tokio::test]
    async fn test_error_status_fails() {
        let client = MockEvaluationClient::new(EvaluationResult {
            status: EvaluationStatus::Error,
            score: None,
            passed: None,
            label: None,
            details: Some("missing contexts".into()),
            cost: None,
        });

        let err = evaluator(client)
            .forward(&InvocationContext::new("trace_1"), Inputs::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing contexts"));
    }
}
