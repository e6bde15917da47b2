//! Hosted evaluation service collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display};

use crate::Result;
use crate::definition::Settings;

/// A request to run a hosted evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Evaluator identifier on the service.
    pub evaluator: String,
    /// Display name of the evaluator node.
    pub name: String,
    /// Evaluator settings.
    pub settings: Settings,
    /// Values to evaluate.
    pub data: Map<String, Value>,
}

/// Outcome status of a hosted evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EvaluationStatus {
    /// The evaluator produced a result.
    Processed,
    /// The evaluator declined to run on this data.
    Skipped,
    /// The evaluator failed.
    Error,
}

/// Monetary cost of an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    /// ISO currency code.
    pub currency: String,
    /// Amount in that currency.
    pub amount: f64,
}

/// Result of a hosted evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Outcome status.
    pub status: EvaluationStatus,
    /// Numeric score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Pass/fail verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    /// Categorical label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Explanation, or the error message when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Cost of the evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Money>,
}

/// Client of the hosted evaluation service.
#[async_trait]
pub trait EvaluationClient: Send + Sync {
    /// Runs an evaluation, authenticated with the given API key.
    async fn evaluate(&self, request: EvaluationRequest, api_key: &str)
    -> Result<EvaluationResult>;
}
