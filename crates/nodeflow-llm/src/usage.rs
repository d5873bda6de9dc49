//! Token and cost accounting.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Price of a model in USD per 1K tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub prompt_per_1k: f64,
    pub completion_per_1k: f64,
}

impl Pricing {
    pub fn new(prompt_per_1k: f64, completion_per_1k: f64) -> Self {
        Self {
            prompt_per_1k,
            completion_per_1k,
        }
    }

    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / 1000.0) * self.prompt_per_1k
            + (completion_tokens as f64 / 1000.0) * self.completion_per_1k
    }
}

/// Accumulated usage of one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub requests: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// USD; zero for models without a price
    pub cost: f64,
}

impl ModelUsage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Thread-safe per-model usage ledger.
#[derive(Debug, Default)]
pub struct UsageTracker {
    pricing: HashMap<String, Pricing>,
    totals: Mutex<HashMap<String, ModelUsage>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the price used for `model`.
    pub fn with_pricing(mut self, model: impl Into<String>, pricing: Pricing) -> Self {
        self.pricing.insert(model.into(), pricing);
        self
    }

    /// Record one request and return its cost.
    pub fn record(&self, model: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        let cost = self
            .pricing
            .get(model)
            .map_or(0.0, |p| p.cost(prompt_tokens, completion_tokens));
        let mut totals = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = totals.entry(model.to_string()).or_default();
        entry.requests += 1;
        entry.prompt_tokens += prompt_tokens;
        entry.completion_tokens += completion_tokens;
        entry.cost += cost;
        debug!(model, prompt_tokens, completion_tokens, cost, "recorded usage");
        cost
    }

    pub fn usage(&self, model: &str) -> Option<ModelUsage> {
        self.totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model)
            .cloned()
    }

    /// Usage of every model seen so far, ordered by model name.
    pub fn snapshot(&self) -> BTreeMap<String, ModelUsage> {
        self.totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn total_cost(&self) -> f64 {
        self.totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|u| u.cost)
            .sum()
    }

    pub fn reset(&self) {
        self.totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Rough token count for budgeting when the provider reports none:
/// one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}
