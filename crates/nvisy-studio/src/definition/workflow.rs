//! Workflow snapshot types.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::node::{Node, NodeId};
use crate::error::{Error, Result};

/// Language model configuration as authored in the editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model name, optionally prefixed by its provider (`openai/gpt-4o`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum number of generated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Extra client parameters; `model` here takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub litellm_params: Option<BTreeMap<String, String>>,
}

impl LlmConfig {
    /// Creates a configuration for the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }
}

/// An immutable workflow snapshot supplied whole with each request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow identifier.
    pub workflow_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Project API key, used by tracing and hosted evaluators.
    #[serde(default)]
    pub api_key: String,
    /// Nodes of the graph, unique by id.
    pub nodes: Vec<Node>,
    /// Language model used by signatures without an override.
    pub default_llm: LlmConfig,
    /// Whether executions of this workflow are traced.
    #[serde(default = "default_enable_tracing")]
    pub enable_tracing: bool,
}

fn default_enable_tracing() -> bool {
    true
}

impl Workflow {
    /// Creates an empty workflow with tracing enabled.
    pub fn new(workflow_id: impl Into<String>, default_llm: LlmConfig) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            name: String::new(),
            api_key: String::new(),
            nodes: Vec::new(),
            default_llm,
            enable_tracing: true,
        }
    }

    /// Adds a node.
    #[must_use]
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Enables or disables tracing.
    #[must_use]
    pub fn with_tracing(mut self, enable_tracing: bool) -> Self {
        self.enable_tracing = enable_tracing;
        self
    }

    /// Returns the node with the given id.
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Checks that node ids are unique.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !seen.insert(&node.id) {
                return Err(Error::configuration(format!(
                    "duplicate node id '{}' in workflow {}",
                    node.id, self.workflow_id
                )));
            }
        }
        Ok(())
    }
}
