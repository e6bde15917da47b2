//! Workflow definition types.
//!
//! These types mirror the JSON the graph editor sends with every request:
//! - [`Workflow`]: the immutable graph snapshot
//! - [`Node`] / [`NodeKind`]: one compilable unit per node
//! - [`Field`]: typed, string-encoded inputs, outputs and parameters
//! - [`ExecutionState`]: what the client sees of an execution

mod field;
mod node;
mod state;
mod workflow;

pub use field::{
    Field, FieldType, FieldValue, Settings, autoparse_fields, coerce_fields, coerce_raw,
    parse_fields,
};
pub use node::{
    Component, Dataset, DatasetColumn, End, Evaluator, InlineDataset, Node, NodeId, NodeKind,
    Retriever, Signature,
};
pub(crate) use state::now_millis;
pub use state::{ExecutionState, ExecutionStatus, Timestamps, WorkflowExecutionState};
pub use workflow::{LlmConfig, Workflow};
