//! Language model collaborator.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::definition::LlmConfig;
use crate::error::{Error, Result};
use crate::module::{InvocationSettings, SignatureSchema};

const DEFAULT_TEMPERATURE: f64 = 0.0;
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Language model client configuration, translated from an [`LlmConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageModelConfig {
    /// Provider prefix of the model name (`openai` in `openai/gpt-4o`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Full model name as given by the editor.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum number of generated tokens.
    pub max_tokens: u32,
    /// Extra client parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl TryFrom<&LlmConfig> for LanguageModelConfig {
    type Error = Error;

    fn try_from(config: &LlmConfig) -> Result<Self> {
        let mut params = config.litellm_params.clone().unwrap_or_default();
        let model = params
            .remove("model")
            .or_else(|| config.model.clone())
            .filter(|m| !m.is_empty())
            .ok_or_else(|| Error::configuration("language model not specified"))?;

        let provider = model
            .split_once('/')
            .map(|(provider, _)| provider.to_owned());

        Ok(Self {
            provider,
            model,
            temperature: config.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            params,
        })
    }
}

/// A prediction request built from a signature schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Declared inputs, outputs and instructions.
    pub schema: Arc<SignatureSchema>,
    /// Input values keyed by input slot.
    pub inputs: Map<String, Value>,
    /// Few-shot demonstrations.
    pub demos: Vec<Map<String, Value>>,
}

/// Token usage and cost reported by a language model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
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

/// A language model answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Output values keyed by output slot.
    pub outputs: Map<String, Value>,
    /// Usage figures, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// A language model client.
#[async_trait]
pub trait LanguageModel: fmt::Debug + Send + Sync {
    /// Returns the model name.
    fn model(&self) -> &str;

    /// Produces the output slots of `request`.
    ///
    /// Clients that cache responses must bypass their cache when
    /// `settings.cache_enabled` is false.
    async fn complete(
        &self,
        request: &CompletionRequest,
        settings: &InvocationSettings,
    ) -> Result<Completion>;
}

/// Creates language model clients from their configuration.
pub trait LanguageModelProvider: Send + Sync {
    /// Creates a client for the given configuration.
    fn language_model(&self, config: &LanguageModelConfig) -> Result<Arc<dyn LanguageModel>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_defaults() {
        let config = LanguageModelConfig::try_from(&LlmConfig::new("openai/gpt-4o-mini")).unwrap();
        assert_eq!(config.provider.as_deref(), Some("openai"));
        assert_eq!(config.model, "openai/gpt-4o-mini");
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_litellm_params_take_precedence() {
        let llm = LlmConfig {
            model: Some("openai/gpt-4o".into()),
            temperature: Some(0.5),
            max_tokens: Some(256),
            litellm_params: Some(BTreeMap::from([
                ("model".to_owned(), "azure/my-deployment".to_owned()),
                ("api_base".to_owned(), "https://example.invalid".to_owned()),
            ])),
        };

        let config = LanguageModelConfig::try_from(&llm).unwrap();
        assert_eq!(config.model, "azure/my-deployment");
        assert_eq!(config.provider.as_deref(), Some("azure"));
        assert_eq!(config.temperature, 0.5);
        assert_eq!(config.max_tokens, 256);
        assert_eq!(config.params.len(), 1);
    }

    #[test]
    fn test_missing_model_is_configuration_error() {
        let err = LanguageModelConfig::try_from(&LlmConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
