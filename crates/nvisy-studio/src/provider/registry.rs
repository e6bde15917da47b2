//! Name to constructor registries for retrieval and evaluation backends.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::RetrieverBackend;
use crate::Result;
use crate::definition::Settings;
use crate::module::Module;

/// Builds a retrieval backend from a retriever node's settings.
pub type RetrieverFactory =
    Arc<dyn Fn(&Settings) -> Result<Arc<dyn RetrieverBackend>> + Send + Sync>;

/// Builds a local evaluator module.
pub type EvaluatorFactory = Arc<dyn Fn() -> Box<dyn Module> + Send + Sync>;

/// Registry of retrieval backends keyed by class name.
pub type RetrieverRegistry = Registry<RetrieverFactory>;

/// Registry of local evaluators keyed by class name.
pub type EvaluatorRegistry = Registry<EvaluatorFactory>;

/// In-memory registry of constructors keyed by class name.
///
/// Populated once at startup and read-only afterwards.
#[derive(Clone)]
pub struct Registry<F> {
    entries: HashMap<String, F>,
}

impl<F> Default for Registry<F> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<F> Registry<F> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieves a constructor by class name.
    pub fn get(&self, name: &str) -> Option<&F> {
        self.entries.get(name)
    }

    /// Returns whether a class name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Lists registered class names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered classes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RetrieverRegistry {
    /// Registers a retrieval backend constructor.
    #[must_use]
    pub fn with_retriever<C>(mut self, name: impl Into<String>, constructor: C) -> Self
    where
        C: Fn(&Settings) -> Result<Arc<dyn RetrieverBackend>> + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Arc::new(constructor));
        self
    }
}

impl EvaluatorRegistry {
    /// Registers a local evaluator constructor.
    #[must_use]
    pub fn with_evaluator<C>(mut self, name: impl Into<String>, constructor: C) -> Self
    where
        C: Fn() -> Box<dyn Module> + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Arc::new(constructor));
        self
    }
}

impl<F> fmt::Debug for Registry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockEvaluator, MockRetriever};

    #[test]
    fn test_lookup_by_name() {
        let registry = RetrieverRegistry::new()
            .with_retriever("ColBERTv2", |_| Ok(Arc::new(MockRetriever::default())))
            .with_retriever("Weaviate", |_| Ok(Arc::new(MockRetriever::default())));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("ColBERTv2"));
        assert!(registry.get("Pinecone").is_none());
        assert_eq!(registry.names(), vec!["ColBERTv2", "Weaviate"]);
    }

    #[test]
    fn test_evaluator_constructor() {
        let registry = EvaluatorRegistry::new()
            .with_evaluator("ExactMatch", || Box::new(MockEvaluator::default()));

        let constructor = registry.get("ExactMatch").unwrap();
        assert_eq!(constructor().name(), "MockEvaluator");
    }
}
