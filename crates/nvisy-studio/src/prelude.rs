//! Prelude module for convenient imports.
//!
//! This module re-exports commonly used types for ergonomic imports:
//!
//! ```rust
//! use nvisy_studio::prelude::*;
//! ```

pub use crate::definition::{
    ExecutionState, ExecutionStatus, Field, FieldType, Node, NodeId, NodeKind, Workflow,
};
pub use crate::engine::{Engine, EngineConfig, NodeCompiler, StudioService};
pub use crate::error::{Error, Result};
pub use crate::event::{StudioClientEvent, StudioServerEvent};
pub use crate::module::{HasCost, InvocationContext, Module, Prediction};
pub use crate::provider::{
    EvaluationClient, EvaluatorRegistry, LanguageModel, LanguageModelProvider, RetrieverBackend,
    RetrieverRegistry,
};
pub use crate::report::{ErrorReporter, LogReporter};
pub use crate::trace::{BufferedTracer, NoopTracer, Tracer};
