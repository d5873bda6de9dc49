use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug};
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{FlowError, FlowResult};
use crate::observe::Observer;

/// Reserved context keys used by the built-in control-flow nodes.
///
/// Keys starting with a double underscore belong to the framework; user
/// code should not write them.
pub mod keys {
    /// Current item of a `LoopNode` iteration.
    pub const LOOP_ITEM: &str = "__loop_item";
    /// Zero-based index of the current `LoopNode` iteration.
    pub const LOOP_INDEX: &str = "__loop_index";
    /// Optional per-iteration result written by a loop body.
    pub const LOOP_RESULT: &str = "__loop_result";
    /// Accumulated loop results, written after the loop.
    pub const LOOP_RESULTS: &str = "__loop_results";
    /// Number of iterations the loop ran.
    pub const LOOP_COUNT: &str = "__loop_count";
    /// Input sequence of a `MapNode`.
    pub const MAP_ITEMS: &str = "__map_items";
    /// Ordered output sequence of a `MapNode`.
    pub const MAP_RESULTS: &str = "__map_results";
}

#[derive(Default)]
struct Shared {
    data: RwLock<HashMap<String, Value>>,
    observer: RwLock<Option<Arc<dyn Observer>>>,
}

/// Shared key-value data bus of one execution.
///
/// Cloning a `Context` clones the handle, not the data: every node of a run
/// sees the same map and writes are visible immediately. The context offers
/// no coordination between concurrently running branches beyond
/// last-write-wins on individual keys.
#[derive(Clone, Default)]
pub struct Context {
    shared: Arc<Shared>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context pre-populated with `entries`.
    pub fn from_map<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let ctx = Self::new();
        ctx.extend(entries);
        ctx
    }

    /// Value stored under `key`, or `None` when absent.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.shared
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Deserialize the value stored under `key`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> FlowResult<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                FlowError::validation(format!("context key {} has unexpected type: {}", key, e))
            }),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.shared
            .data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn has(&self, key: &str) -> bool {
        self.shared
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Remove `key`, returning its previous value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.shared
            .data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .shared
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.shared
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordered copy of every entry.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.shared
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Insert every entry, overwriting existing keys.
    pub fn extend<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.shared
            .data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(entries);
    }

    /// Attach the observability collaborator shared by every node of the run.
    pub fn set_observer(&self, observer: Arc<dyn Observer>) {
        *self
            .shared
            .observer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    pub fn observer(&self) -> Option<Arc<dyn Observer>> {
        self.shared
            .observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True when both handles point at the same underlying data.
    pub fn same_as(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("data", &self.to_map())
            .field("observed", &self.observer().is_some())
            .finish()
    }
}
