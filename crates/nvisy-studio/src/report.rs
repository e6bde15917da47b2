//! Error-tracking collaborator.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Tracing target for reported failures.
const TRACING_TARGET: &str = "nvisy_studio::report";

/// Context attached to a reported failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Trace of the failed execution.
    pub trace_id: String,
    /// Workflow of the failed execution.
    pub workflow_id: String,
}

/// Sink for execution failures, called once per failed execution.
///
/// Reporting is fire-and-forget: implementations must not block and cannot
/// fail the execution.
pub trait ErrorReporter: Send + Sync {
    /// Reports a failure.
    fn report(&self, error: &Error, context: &ErrorContext);
}

/// Reports failures to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, error: &Error, context: &ErrorContext) {
        tracing::error!(
            target: TRACING_TARGET,
            trace_id = %context.trace_id,
            workflow_id = %context.workflow_id,
            error = ?error,
            "Component execution failed"
        );
    }
}
