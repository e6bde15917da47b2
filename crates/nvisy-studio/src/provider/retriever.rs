//! Retrieval backend collaborator.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use crate::module::InvocationSettings;

/// A passage returned by a retrieval backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Passage text.
    pub content: String,
    /// Backend-specific metadata (source, score, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Passage {
    /// Creates a passage with no metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: None,
        }
    }
}

impl From<&str> for Passage {
    fn from(content: &str) -> Self {
        Self::new(content)
    }
}

/// A retrieval backend.
#[async_trait]
pub trait RetrieverBackend: fmt::Debug + Send + Sync {
    /// Fetches up to `k` passages relevant to `query`.
    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        settings: &InvocationSettings,
    ) -> Result<Vec<Passage>>;
}
