use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LlmResult;

/// A text completion and embedding provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a single user prompt.
    async fn complete(&self, prompt: &str) -> LlmResult<String>;

    /// Embed one text into a vector.
    async fn embed(&self, text: &str) -> LlmResult<Vec<f32>>;
}

#[async_trait]
impl<C: LlmClient + ?Sized> LlmClient for Arc<C> {
    async fn complete(&self, prompt: &str) -> LlmResult<String> {
        (**self).complete(prompt).await
    }

    async fn embed(&self, text: &str) -> LlmResult<Vec<f32>> {
        (**self).embed(text).await
    }
}
