use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;

/// All possible errors that can occur while building or running a graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    /// A stage received or produced malformed input, e.g. a batch prep
    /// stage that did not yield a sequence.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A node's execute stage failed.
    #[error("Execution error: {0}")]
    Execution(String),

    /// The fallback stage of a node failed after retries were exhausted.
    #[error("Fallback of node {node} failed: {message}")]
    Fallback { node: String, message: String },

    /// A `TimeoutNode` lost its race against the timer.
    #[error("Node {node} timed out after {after:?}")]
    Timeout { node: String, after: Duration },

    /// An external provider (LLM, network) failed.
    #[error("Provider error: {0}")]
    Provider(String),

    /// A flow ran more node steps than its configured limit.
    #[error("Flow exceeded the step limit of {0}")]
    StepLimit(usize),

    /// Error during (de)serialization of context values or parameters.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Other generic errors
    #[error("{0}")]
    Other(String),
}

/// A specialized Result type for nodeflow operations
pub type FlowResult<T> = Result<T, FlowError>;

impl FlowError {
    /// Create a new execution error
    pub fn execution(message: impl Display) -> Self {
        Self::Execution(message.to_string())
    }

    /// Create a new execution error tagged with the failing node
    pub fn node_execution(node: impl Display, message: impl Display) -> Self {
        Self::Execution(format!("Node {}: {}", node, message))
    }

    /// Create a new validation error
    pub fn validation(message: impl Display) -> Self {
        Self::Validation(message.to_string())
    }

    /// Create a new provider error
    pub fn provider(message: impl Display) -> Self {
        Self::Provider(message.to_string())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
