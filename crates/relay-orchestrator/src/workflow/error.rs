//! Workflow and node handler errors.

use crate::error::OrchestrationError;
use thiserror::Error;

/// Errors raised by node handlers.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A required input port has no value.
    #[error("Missing required input '{port}'")]
    MissingInput {
        /// Port name
        port: String,
    },

    /// A parameter is missing or malformed.
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// What is wrong with it
        message: String,
    },

    /// Routing the node's request failed.
    #[error(transparent)]
    Routing(#[from] OrchestrationError),

    /// File system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP call failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A transform or filter operation could not be applied.
    #[error("Transform failed: {0}")]
    Transform(String),

    /// The run was cancelled while the handler was working.
    #[error("Node cancelled")]
    Cancelled,
}

impl NodeError {
    /// Shorthand for `InvalidParameter`.
    pub fn invalid_parameter(name: &str, message: impl Into<String>) -> Self {
        Self::InvalidParameter { name: name.to_string(), message: message.into() }
    }

    /// Shorthand for `MissingInput`.
    pub fn missing_input(port: &str) -> Self {
        Self::MissingInput { port: port.to_string() }
    }
}

/// Errors that fail a workflow run.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The definition is structurally invalid.
    #[error("Invalid workflow: {0}")]
    Invalid(String),

    /// The definition could not be parsed.
    #[error("Failed to parse workflow: {0}")]
    Parse(#[from] serde_json::Error),

    /// The definition could not be read or written.
    #[error("Workflow I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A connection references a node that does not exist.
    #[error("Connection '{connection}' references unknown node '{node_id}'")]
    UnknownNode {
        /// Connection id (may be empty)
        connection: String,
        /// Missing node id
        node_id: String,
    },

    /// The connections form a cycle.
    #[error("Cycle detected: {}", path.join(" -> "))]
    CycleDetected {
        /// Node ids along the cycle, first and last equal
        path: Vec<String>,
    },

    /// No handler is registered for a node's type.
    #[error("Node '{node_id}' has unknown type '{node_type}'")]
    UnknownNodeType {
        /// Node id
        node_id: String,
        /// Type tag
        node_type: String,
    },

    /// A handler failed; the run was aborted.
    #[error("Node '{node_id}' ({node_type}) failed: {source}")]
    NodeFailed {
        /// Node id
        node_id: String,
        /// Type tag
        node_type: String,
        /// Handler error
        #[source]
        source: NodeError,
    },

    /// The run was cancelled between nodes.
    #[error("Workflow cancelled")]
    Cancelled,
}

impl WorkflowError {
    /// Id of the node that failed, if a node failed.
    #[must_use]
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeFailed { node_id, .. } | Self::UnknownNodeType { node_id, .. } => {
                Some(node_id)
            }
            _ => None,
        }
    }
}

/// Result type for workflow operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;
