//! Notifications sent to the editor.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::definition::{ExecutionState, NodeId, WorkflowExecutionState};

/// Payload of a node state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStateChangePayload {
    /// Node whose state changed.
    pub component_id: NodeId,
    /// The node's current state.
    pub execution_state: ExecutionState,
}

/// Payload of a workflow state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStateChangePayload {
    /// The workflow's current state.
    pub execution_state: WorkflowExecutionState,
}

/// Free-text payload of `debug` and `error` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Message text.
    pub message: String,
}

/// Server to client message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StudioServerEvent {
    /// Answer to a liveness check.
    IsAliveResponse,
    /// A node changed phase.
    ComponentStateChange {
        payload: ComponentStateChangePayload,
    },
    /// A workflow run changed phase.
    ExecutionStateChange {
        payload: ExecutionStateChangePayload,
    },
    /// Progress note.
    Debug { payload: MessagePayload },
    /// Execution failure.
    Error { payload: MessagePayload },
    /// Last event of a stream.
    Done,
}

impl StudioServerEvent {
    /// Creates a `debug` event.
    pub fn debug(message: impl Into<String>) -> Self {
        Self::Debug {
            payload: MessagePayload {
                message: message.into(),
            },
        }
    }

    /// Creates an `error` event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            payload: MessagePayload {
                message: message.into(),
            },
        }
    }

    /// Creates a `component_state_change` event.
    pub fn component_state(component_id: NodeId, execution_state: ExecutionState) -> Self {
        Self::ComponentStateChange {
            payload: ComponentStateChangePayload {
                component_id,
                execution_state,
            },
        }
    }

    /// Returns the wire type tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::IsAliveResponse => "is_alive_response",
            Self::ComponentStateChange { .. } => "component_state_change",
            Self::ExecutionStateChange { .. } => "execution_state_change",
            Self::Debug { .. } => "debug",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }

    /// Returns the node state carried by a `component_state_change`.
    pub fn component_state_ref(&self) -> Option<&ExecutionState> {
        match self {
            Self::ComponentStateChange { payload } => Some(&payload.execution_state),
            _ => None,
        }
    }

    /// Serializes the event as a server-sent events frame.
    pub fn to_sse(&self) -> Result<String> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}
