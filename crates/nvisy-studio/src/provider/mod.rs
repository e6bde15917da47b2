//! External collaborators the compiled modules call into.
//!
//! The crate embeds no backend logic: language models, retrieval backends and
//! the hosted evaluation service are reached through the traits below, and
//! backends are resolved by class name through the [`Registry`] types.

mod evaluation;
mod lm;
mod registry;
mod retriever;

pub use evaluation::{EvaluationClient, EvaluationRequest, EvaluationResult, EvaluationStatus, Money};
pub use lm::{
    Completion, CompletionRequest, LanguageModel, LanguageModelConfig, LanguageModelProvider,
    TokenUsage,
};
pub use registry::{
    EvaluatorFactory, EvaluatorRegistry, Registry, RetrieverFactory, RetrieverRegistry,
};
pub use retriever::{Passage, RetrieverBackend};
