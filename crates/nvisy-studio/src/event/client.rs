//! Commands sent by the editor.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::definition::{NodeId, Workflow};

/// Payload of a liveness check. Always empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsAlivePayload {}

/// Payload of a single-node execution request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteComponentPayload {
    /// Trace the execution is recorded under.
    pub trace_id: String,
    /// Workflow snapshot containing the node.
    pub workflow: Workflow,
    /// Node to execute.
    pub node_id: NodeId,
    /// Raw input values keyed by input field identifier.
    #[serde(default)]
    pub inputs: HashMap<String, String>,
}

/// Payload of a stop request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopExecutionPayload {
    /// Trace to stop.
    pub trace_id: String,
    /// Restricts the stop to one node of the trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
}

/// Client to server message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StudioClientEvent {
    /// Liveness check.
    IsAlive {
        #[serde(default)]
        payload: IsAlivePayload,
    },
    /// Runs one node of a workflow.
    ExecuteComponent { payload: ExecuteComponentPayload },
    /// Stops a running execution.
    StopExecution { payload: StopExecutionPayload },
}

impl StudioClientEvent {
    /// Creates a liveness check.
    pub fn is_alive() -> Self {
        Self::IsAlive {
            payload: IsAlivePayload::default(),
        }
    }

    /// Returns the wire type tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::IsAlive { .. } => "is_alive",
            Self::ExecuteComponent { .. } => "execute_component",
            Self::StopExecution { .. } => "stop_execution",
        }
    }

    /// Returns the trace the command refers to, if any.
    pub fn trace_id(&self) -> Option<&str> {
        match self {
            Self::IsAlive { .. } => None,
            Self::ExecuteComponent { payload } => Some(&payload.trace_id),
            Self::StopExecution { payload } => Some(&payload.trace_id),
        }
    }
}
