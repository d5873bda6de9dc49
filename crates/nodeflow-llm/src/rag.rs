//! Chunking, embedding and similarity search for retrieval-augmented flows.

use std::cmp::Ordering;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::client::LlmClient;
use crate::error::LlmResult;

/// Split `text` into windows of at most `size` characters, each starting
/// `size - overlap` characters after the previous one.
///
/// An overlap of `size` or more is reduced to `size - 1` so the window always
/// advances. A `size` of 0 yields no chunks.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    if size == 0 {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let step = size - overlap.min(size - 1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Embed every text concurrently, keeping input order.
pub async fn embed_all<C, S>(client: &C, texts: &[S]) -> LlmResult<Vec<Vec<f32>>>
where
    C: LlmClient + ?Sized,
    S: AsRef<str>,
{
    try_join_all(texts.iter().map(|t| client.embed(t.as_ref()))).await
}

/// A retrieved chunk and its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub score: f32,
}

/// Brute-force in-memory vector index.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: Vec<(String, Vec<f32>)>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, text: impl Into<String>, embedding: Vec<f32>) {
        self.entries.push((text.into(), embedding));
    }

    /// Chunk `text`, embed the chunks and add them; returns the chunk count.
    pub async fn index_document<C>(
        &mut self,
        client: &C,
        text: &str,
        chunk_size: usize,
        overlap: usize,
    ) -> LlmResult<usize>
    where
        C: LlmClient + ?Sized,
    {
        let chunks = chunk_text(text, chunk_size, overlap);
        let embeddings = embed_all(client, &chunks).await?;
        let added = chunks.len();
        self.entries.extend(chunks.into_iter().zip(embeddings));
        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `k` entries most similar to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .map(|(text, embedding)| SearchHit {
                text: text.clone(),
                score: cosine_similarity(query, embedding),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(k);
        hits
    }
}
