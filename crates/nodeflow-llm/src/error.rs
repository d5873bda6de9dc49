use nodeflow_core::FlowError;
use thiserror::Error;

/// Errors raised while talking to an LLM provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Transport failure (connect, timeout, body decoding)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider answered, but not with what was asked for.
    #[error("Malformed provider response: {0}")]
    Response(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type LlmResult<T> = Result<T, LlmError>;

impl From<LlmError> for FlowError {
    fn from(err: LlmError) -> Self {
        FlowError::provider(err)
    }
}
