//! OpenAI-compatible HTTP client. Works with OpenAI, Ollama, vLLM, Groq, etc.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::LlmClient;
use crate::config::LlmConfig;
use crate::error::{LlmError, LlmResult};
use crate::usage::{estimate_tokens, UsageTracker};

/// Client for the `/chat/completions` and `/embeddings` endpoints.
pub struct OpenAiClient {
    http: Client,
    config: LlmConfig,
    usage: Option<Arc<UsageTracker>>,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> LlmResult<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            config,
            usage: None,
        })
    }

    /// Record token usage of every completion in `tracker`.
    pub fn with_usage_tracker(mut self, tracker: Arc<UsageTracker>) -> Self {
        self.usage = Some(tracker);
        self
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn post<T: Serialize>(&self, path: &str, body: &T) -> RequestBuilder {
        let req = self.http.post(self.config.endpoint(path)).json(body);
        match &self.config.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn send<R: for<'de> Deserialize<'de>>(req: RequestBuilder) -> LlmResult<R> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "provider request failed");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Copy)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

fn completion_text(resp: ChatResponse) -> LlmResult<(String, Option<ChatUsage>)> {
    let usage = resp.usage;
    let content = resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| LlmError::Response("completion has no message content".to_string()))?;
    Ok((content, usage))
}

fn first_embedding(resp: EmbeddingResponse) -> LlmResult<Vec<f32>> {
    resp.data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| LlmError::Response("embedding response has no data".to_string()))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, prompt: &str) -> LlmResult<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        debug!(model = %self.config.model, prompt_chars = prompt.len(), "requesting completion");
        let resp: ChatResponse = Self::send(self.post("chat/completions", &request)).await?;
        let (content, usage) = completion_text(resp)?;

        if let Some(tracker) = &self.usage {
            let (prompt_tokens, completion_tokens) = match usage {
                Some(u) => (u.prompt_tokens, u.completion_tokens),
                None => (estimate_tokens(prompt), estimate_tokens(&content)),
            };
            tracker.record(&self.config.model, prompt_tokens, completion_tokens);
        }
        Ok(content)
    }

    async fn embed(&self, text: &str) -> LlmResult<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: vec![text],
        };
        let resp: EmbeddingResponse = Self::send(self.post("embeddings", &request)).await?;
        first_embedding(resp)
    }
}
