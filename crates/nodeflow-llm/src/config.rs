//! Provider configuration.

use std::time::Duration;

use crate::error::{LlmError, LlmResult};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Configuration for an OpenAI-compatible provider.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    /// API root, e.g. "https://api.openai.com/v1" or a local Ollama/vLLM URL
    pub base_url: String,
    /// Bearer token; local servers usually need none
    pub api_key: Option<String>,
    /// Chat model used by `complete`
    pub model: String,
    /// Model used by `embed`
    pub embedding_model: String,
    /// Per-request timeout
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl LlmConfig {
    /// Create a configuration for the provider at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout: Duration::from_secs(60),
            max_tokens: 1024,
            temperature: None,
        }
    }

    /// Read the configuration from the process environment.
    ///
    /// `NODEFLOW_LLM_BASE_URL`, `NODEFLOW_LLM_MODEL` and
    /// `NODEFLOW_EMBEDDING_MODEL` override the defaults. The key comes from
    /// `NODEFLOW_LLM_API_KEY`, then `OPENAI_API_KEY`. A remote default URL
    /// without any key is rejected.
    pub fn from_env() -> LlmResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> LlmResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut config = match var("NODEFLOW_LLM_BASE_URL") {
            Some(url) => Self::new(url),
            None => Self::default(),
        };
        if let Some(key) = var("NODEFLOW_LLM_API_KEY").or_else(|| var("OPENAI_API_KEY")) {
            config.api_key = Some(key);
        }
        if let Some(model) = var("NODEFLOW_LLM_MODEL") {
            config.model = model;
        }
        if let Some(model) = var("NODEFLOW_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }

        if config.api_key.is_none() && config.base_url == DEFAULT_BASE_URL {
            return Err(LlmError::Config(
                "no API key set (NODEFLOW_LLM_API_KEY or OPENAI_API_KEY)".to_string(),
            ));
        }
        Ok(config)
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the chat model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the embedding model.
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
