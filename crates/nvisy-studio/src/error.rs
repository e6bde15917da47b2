//! Studio error types.

use std::fmt;

use thiserror::Error;

use crate::definition::FieldType;

/// Result type for studio operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while compiling or executing a studio node.
#[derive(Debug, Error)]
pub enum Error {
    /// Node configuration is invalid (missing or unregistered backend,
    /// missing evaluator identifier, conflicting fields, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A string-encoded field value could not be parsed as its declared type.
    #[error("cannot parse field '{field}' value {value:?} as {field_type}: {reason}")]
    Parse {
        /// Identifier of the field being coerced.
        field: String,
        /// Declared type of the field.
        field_type: FieldType,
        /// Raw value that failed to parse.
        value: String,
        /// Parser error message.
        reason: String,
    },

    /// The node type tag has no compilation path.
    #[error("unsupported node type: {0}")]
    UnsupportedNodeType(String),

    /// The requested node is not part of the workflow.
    #[error("node {0} not found in workflow")]
    NodeNotFound(String),

    /// The compiled module failed while running.
    #[error("invocation failed: {0}")]
    Invocation(String),

    /// Execution was stopped by the client.
    #[error("execution cancelled")]
    Cancelled,

    /// Trace scope could not be opened or flushed.
    #[error("tracing error: {0}")]
    Tracing(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Creates a configuration error.
    pub fn configuration(message: impl fmt::Display) -> Self {
        Self::Configuration(message.to_string())
    }

    /// Creates an invocation error.
    pub fn invocation(message: impl fmt::Display) -> Self {
        Self::Invocation(message.to_string())
    }

    /// Creates a tracing error.
    pub fn tracing(message: impl fmt::Display) -> Self {
        Self::Tracing(message.to_string())
    }

    /// Creates a parse error for the given field.
    pub fn parse(
        field: impl Into<String>,
        field_type: FieldType,
        value: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        Self::Parse {
            field: field.into(),
            field_type,
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if this error was raised while building the module
    /// rather than while running it.
    pub fn is_compilation(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Parse { .. } | Self::UnsupportedNodeType(_)
        )
    }

    /// Returns true if this error is a client-requested stop.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
