//! Node compiler.
//!
//! Turns one [`Node`] of a [`Workflow`] into an executable [`Module`]. Each
//! node kind has exactly one compilation path:
//!
//! | kind        | module                                          |
//! |-------------|-------------------------------------------------|
//! | `signature` | [`Predict`] over a [`SignatureSchema`]          |
//! | `retriever` | [`ContextsRetriever`] over a registered backend |
//! | `evaluator` | [`HostedEvaluator`] or a registered evaluator   |
//! | `end`       | [`EndModule`]                                   |
//!
//! Any other type tag fails with [`Error::UnsupportedNodeType`].

use std::fmt;
use std::sync::Arc;

use crate::definition::{
    Evaluator, InlineDataset, Node, NodeKind, Retriever, Signature, Workflow, coerce_fields,
};
use crate::error::{Error, Result};
use crate::module::{
    ContextsRetriever, EndModule, HOSTED_EVALUATOR_CLASS, HostedEvaluator, Module, Predict,
    SignatureSchema,
};
use crate::provider::{
    EvaluationClient, EvaluatorRegistry, LanguageModelConfig, LanguageModelProvider,
    RetrieverRegistry,
};

/// Tracing target for compilation.
const TRACING_TARGET: &str = "nvisy_studio::compiler";

/// Compiles workflow nodes into executable modules.
///
/// Registries are fixed at construction and only read afterwards, so one
/// compiler can be shared by every execution.
#[derive(Clone)]
pub struct NodeCompiler {
    provider: Arc<dyn LanguageModelProvider>,
    retrievers: RetrieverRegistry,
    evaluators: EvaluatorRegistry,
    evaluation: Option<Arc<dyn EvaluationClient>>,
}

impl NodeCompiler {
    /// Creates a compiler with empty registries and no hosted evaluation.
    pub fn new(provider: Arc<dyn LanguageModelProvider>) -> Self {
        Self {
            provider,
            retrievers: RetrieverRegistry::new(),
            evaluators: EvaluatorRegistry::new(),
            evaluation: None,
        }
    }

    /// Sets the retriever registry.
    #[must_use]
    pub fn with_retrievers(mut self, retrievers: RetrieverRegistry) -> Self {
        self.retrievers = retrievers;
        self
    }

    /// Sets the local evaluator registry.
    #[must_use]
    pub fn with_evaluators(mut self, evaluators: EvaluatorRegistry) -> Self {
        self.evaluators = evaluators;
        self
    }

    /// Sets the hosted evaluation client.
    #[must_use]
    pub fn with_evaluation_client(mut self, client: Arc<dyn EvaluationClient>) -> Self {
        self.evaluation = Some(client);
        self
    }

    /// Compiles a node of `workflow` into a module.
    pub fn compile(&self, node: &Node, workflow: &Workflow) -> Result<Box<dyn Module>> {
        tracing::debug!(
            target: TRACING_TARGET,
            node_id = %node.id,
            node_type = node.type_name(),
            workflow_id = %workflow.workflow_id,
            "Compiling node"
        );

        match &node.kind {
            NodeKind::Signature(signature) => self.compile_signature(signature, workflow),
            NodeKind::Retriever(retriever) => self.compile_retriever(retriever),
            NodeKind::Evaluator(evaluator) => self.compile_evaluator(evaluator, workflow),
            NodeKind::End(_) => Ok(Box::new(EndModule)),
            NodeKind::Unsupported { type_name, .. } => {
                Err(Error::UnsupportedNodeType(type_name.clone()))
            }
        }
    }

    fn compile_signature(
        &self,
        signature: &Signature,
        workflow: &Workflow,
    ) -> Result<Box<dyn Module>> {
        let schema = SignatureSchema::from_signature(signature)?;
        let llm = signature.llm.as_ref().unwrap_or(&workflow.default_llm);
        let config = LanguageModelConfig::try_from(llm)?;
        let lm = self.provider.language_model(&config)?;

        let demos = signature
            .demonstrations
            .as_ref()
            .and_then(|dataset| dataset.inline.as_ref())
            .map(InlineDataset::to_examples)
            .unwrap_or_default();

        tracing::trace!(
            target: TRACING_TARGET,
            signature = %schema.name,
            model = %config.model,
            demos = demos.len(),
            "Signature compiled"
        );

        Ok(Box::new(Predict::new(schema, lm).with_demos(demos)))
    }

    fn compile_retriever(&self, retriever: &Retriever) -> Result<Box<dyn Module>> {
        let cls = non_empty(retriever.cls.as_deref())
            .ok_or_else(|| Error::configuration("retriever class not specified"))?;
        let factory = self.retrievers.get(cls).ok_or_else(|| {
            Error::configuration(format!(
                "unknown retriever class '{cls}', expected one of: {}",
                self.retrievers.names().join(", ")
            ))
        })?;

        let settings = coerce_fields(retriever.component.parameter_fields())?;
        let backend = factory(&settings)?;
        let name = retriever.component.name.as_deref().unwrap_or(cls);

        Ok(Box::new(ContextsRetriever::new(name, backend, &settings)))
    }

    fn compile_evaluator(
        &self,
        evaluator: &Evaluator,
        workflow: &Workflow,
    ) -> Result<Box<dyn Module>> {
        let cls = non_empty(evaluator.cls.as_deref())
            .ok_or_else(|| Error::configuration("evaluator class not specified"))?;

        if cls != HOSTED_EVALUATOR_CLASS {
            let constructor = self.evaluators.get(cls).ok_or_else(|| {
                Error::configuration(format!("unknown evaluator class '{cls}'"))
            })?;
            return Ok(constructor());
        }

        let evaluator_id = non_empty(evaluator.evaluator.as_deref()).ok_or_else(|| {
            Error::configuration(format!("{HOSTED_EVALUATOR_CLASS} requires an evaluator id"))
        })?;
        let client = self.evaluation.clone().ok_or_else(|| {
            Error::configuration("hosted evaluation service is not configured")
        })?;

        let settings = coerce_fields(evaluator.component.parameter_fields())?;
        let name = non_empty(evaluator.component.name.as_deref()).unwrap_or(HOSTED_EVALUATOR_CLASS);

        Ok(Box::new(HostedEvaluator::new(
            client,
            workflow.api_key.clone(),
            evaluator_id,
            name,
            settings,
        )))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl fmt::Debug for NodeCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCompiler")
            .field("retrievers", &self.retrievers)
            .field("evaluators", &self.evaluators)
            .field("evaluation", &self.evaluation.is_some())
            .finish_non_exhaustive()
    }
}
