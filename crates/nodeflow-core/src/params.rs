//! Execution-scoped node parameters.
//!
//! Parameters are an immutable snapshot threaded down the run call chain.
//! Enclosing flows never mutate a node to smuggle per-run parameters in;
//! they pass a merged snapshot to `Node::run` instead, which keeps
//! concurrent sub-runs isolated from each other.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{FlowError, FlowResult};

/// Immutable, cheaply clonable `String -> Value` mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Arc<HashMap<String, Value>>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Return a copy with `key` set to `value`.
    pub fn with(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut entries = (*self.entries).clone();
        entries.insert(key.into(), value.into());
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Overlay `overrides` on top of `self`; keys present in both take the
    /// value from `overrides`.
    pub fn merged(&self, overrides: &Params) -> Self {
        if overrides.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return overrides.clone();
        }
        let mut entries = (*self.entries).clone();
        for (key, value) in overrides.iter() {
            entries.insert(key.clone(), value.clone());
        }
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Build parameters from a JSON object.
    pub fn from_object(value: Value) -> FlowResult<Self> {
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(FlowError::validation(format!(
                "parameter set must be an object, got {}",
                other
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(map)
    }
}

impl FromIterator<(String, Value)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: Arc::new(iter.into_iter().collect()),
        }
    }
}

impl From<HashMap<String, Value>> for Params {
    fn from(entries: HashMap<String, Value>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Params {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect()
    }
}
