//! Time-bounded response cache.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::client::LlmClient;
use crate::error::LlmResult;

/// A string-keyed cache whose entries expire `ttl` after insertion.
///
/// Expired entries are skipped on lookup and dropped by
/// [`TtlCache::purge_expired`].
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|(inserted, _)| inserted.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), (Instant::now(), value));
    }

    /// Drop expired entries and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, (inserted, _)| inserted.elapsed() < self.ttl);
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Wraps a client and answers repeated prompts and texts from a cache.
pub struct CachedClient<C> {
    inner: C,
    completions: TtlCache<String>,
    embeddings: TtlCache<Vec<f32>>,
}

impl<C: LlmClient> CachedClient<C> {
    pub fn new(inner: C, ttl: Duration) -> Self {
        Self {
            inner,
            completions: TtlCache::new(ttl),
            embeddings: TtlCache::new(ttl),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn completions(&self) -> &TtlCache<String> {
        &self.completions
    }

    pub fn embeddings(&self) -> &TtlCache<Vec<f32>> {
        &self.embeddings
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for CachedClient<C> {
    async fn complete(&self, prompt: &str) -> LlmResult<String> {
        if let Some(hit) = self.completions.get(prompt) {
            debug!(prompt_chars = prompt.len(), "completion cache hit");
            return Ok(hit);
        }
        let text = self.inner.complete(prompt).await?;
        self.completions.insert(prompt, text.clone());
        Ok(text)
    }

    async fn embed(&self, text: &str) -> LlmResult<Vec<f32>> {
        if let Some(hit) = self.embeddings.get(text) {
            debug!(text_chars = text.len(), "embedding cache hit");
            return Ok(hit);
        }
        let vector = self.inner.embed(text).await?;
        self.embeddings.insert(text, vector.clone());
        Ok(vector)
    }
}
