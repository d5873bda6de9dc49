//! LLM collaborator for nodeflow graphs.
//!
//! Provides an OpenAI-compatible HTTP client behind the [`LlmClient`] trait,
//! a TTL response cache, token and cost accounting, and the chunk / embed /
//! retrieve helpers used by retrieval-augmented flows. Nodes call these from
//! their execute stage; [`LlmError`] converts into
//! [`FlowError::Provider`](nodeflow_core::FlowError::Provider) so node retry
//! and fallback treat provider failures like any other.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod nodes;
pub mod openai;
pub mod rag;
pub mod usage;

pub use cache::{CachedClient, TtlCache};
pub use client::LlmClient;
pub use config::LlmConfig;
pub use error::{LlmError, LlmResult};
pub use nodes::completion_node;
pub use openai::OpenAiClient;
pub use rag::{chunk_text, cosine_similarity, embed_all, SearchHit, VectorIndex};
pub use usage::{estimate_tokens, ModelUsage, Pricing, UsageTracker};
