//! Observable execution state of nodes and workflows.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display};

use super::node::NodeId;

/// Phase of an execution.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    /// Never executed.
    #[default]
    Idle,
    /// Queued, not yet started.
    Waiting,
    /// Started and not finished.
    Running,
    /// Finished with a result.
    Success,
    /// Finished with an error.
    Error,
}

impl ExecutionStatus {
    /// Returns true for `success` and `error`.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// Start and finish times in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    /// When execution started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    /// When execution finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
}

/// Current time in epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    Timestamp::now().as_millisecond()
}

/// Observable state of one node's most recent execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Current phase.
    pub status: ExecutionStatus,
    /// Trace the execution belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Inputs the node was invoked with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Map<String, Value>>,
    /// Outputs of a successful execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Map<String, Value>>,
    /// Cost of a successful execution, when the result exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Error message of a failed execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Start and finish times.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Timestamps>,
}

impl ExecutionState {
    /// State emitted when an execution starts.
    pub fn running(trace_id: impl Into<String>, inputs: Map<String, Value>) -> Self {
        Self {
            status: ExecutionStatus::Running,
            trace_id: Some(trace_id.into()),
            inputs: Some(inputs),
            timestamps: Some(Timestamps {
                started_at: Some(now_millis()),
                finished_at: None,
            }),
            ..Self::default()
        }
    }

    /// State emitted when an execution finishes with a result.
    pub fn success(
        trace_id: impl Into<String>,
        outputs: Map<String, Value>,
        cost: Option<f64>,
    ) -> Self {
        Self {
            status: ExecutionStatus::Success,
            trace_id: Some(trace_id.into()),
            outputs: Some(outputs),
            cost,
            timestamps: Some(Timestamps {
                started_at: None,
                finished_at: Some(now_millis()),
            }),
            ..Self::default()
        }
    }
}

/// Observable state of a whole-workflow run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionState {
    /// Current phase.
    pub status: ExecutionStatus,
    /// Trace the run belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Node currently running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_component_id: Option<NodeId>,
    /// Outputs of the terminal node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Map<String, Value>>,
    /// Error message of a failed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Start and finish times.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Timestamps>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_running_state_wire_format() {
        let state = ExecutionState::running("trace_1", Map::new());
        let value = serde_json::to_value(&state).unwrap();

        assert_eq!(value["status"], json!("running"));
        assert_eq!(value["trace_id"], json!("trace_1"));
        assert!(value["timestamps"]["started_at"].is_i64());
        assert!(value.get("outputs").is_none());
        assert!(!state.status.is_terminal());
    }

    #[test]
    fn test_success_state_carries_cost() {
        let mut outputs = Map::new();
        outputs.insert("answer".into(), json!("42"));
        let state = ExecutionState::success("trace_1", outputs, Some(0.002));

        assert!(state.status.is_terminal());
        assert_eq!(state.cost, Some(0.002));
        assert_eq!(state.status.to_string(), "success");
    }
}
