//! Context snapshots and the stores that persist them.
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::context::Context;
use crate::error::FlowError;

/// A point-in-time copy of a context's data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Identifier of the flow run the snapshot belongs to
    pub flow_id: String,
    pub timestamp: DateTime<Utc>,
    /// Every context entry at capture time
    pub data: BTreeMap<String, Value>,
    /// Free-form caller annotations
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Snapshot {
    /// Copy the current contents of `ctx`.
    pub fn capture(flow_id: impl Into<String>, ctx: &Context) -> Self {
        Self {
            flow_id: flow_id.into(),
            timestamp: Utc::now(),
            data: ctx.to_map(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Materialize the snapshot as a fresh context.
    pub fn restore(&self) -> Context {
        Context::from_map(self.data.clone())
    }

    /// Write the snapshot's entries into an existing context, overwriting
    /// keys it shares with the snapshot.
    pub fn restore_into(&self, ctx: &Context) {
        ctx.extend(self.data.clone());
    }

    /// Serialize the snapshot to a JSON byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        serde_json::to_vec(self).map_err(CheckpointError::Serde)
    }

    /// Deserialize a snapshot from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        serde_json::from_slice(bytes).map_err(CheckpointError::Serde)
    }
}

/// Errors occurring during snapshot persistence or serialization.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Store error: {0}")]
    Store(String),
}

impl From<CheckpointError> for FlowError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::Serde(e) => FlowError::Serialization(e.to_string()),
            other => FlowError::Other(other.to_string()),
        }
    }
}

/// A trait for persisting and loading context snapshots, keyed by flow id.
pub trait SnapshotStore: Send + Sync {
    /// Persist `snapshot`, replacing any previous one for the same flow id.
    fn save(&self, snapshot: &Snapshot) -> Result<(), CheckpointError>;
    /// Load the last saved snapshot for `flow_id`, if any.
    fn load(&self, flow_id: &str) -> Result<Option<Snapshot>, CheckpointError>;
    /// Flow ids with a saved snapshot, sorted.
    fn list(&self) -> Result<Vec<String>, CheckpointError>;
    /// Remove the snapshot for `flow_id`; returns whether one existed.
    fn delete(&self, flow_id: &str) -> Result<bool, CheckpointError>;
}

/// Process-local snapshot store.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    inner: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> Result<(), CheckpointError> {
        let bytes = snapshot.to_bytes()?;
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.flow_id.clone(), bytes);
        Ok(())
    }

    fn load(&self, flow_id: &str) -> Result<Option<Snapshot>, CheckpointError> {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(flow_id)
            .map(|bytes| Snapshot::from_bytes(bytes))
            .transpose()
    }

    fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let mut ids: Vec<String> = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn delete(&self, flow_id: &str) -> Result<bool, CheckpointError> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(flow_id)
            .is_some())
    }
}

/// Stores one `<flow_id>.json` file per snapshot in a directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Use `dir` as the store root, creating it when missing.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, flow_id: &str) -> Result<PathBuf, CheckpointError> {
        let safe = !flow_id.is_empty()
            && !flow_id.starts_with('.')
            && flow_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !safe {
            return Err(CheckpointError::Store(format!(
                "invalid flow id for file store: {:?}",
                flow_id
            )));
        }
        Ok(self.dir.join(format!("{}.json", flow_id)))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> Result<(), CheckpointError> {
        let path = self.path_for(&snapshot.flow_id)?;
        fs::write(&path, snapshot.to_bytes()?)?;
        debug!(flow_id = %snapshot.flow_id, path = %path.display(), "snapshot saved");
        Ok(())
    }

    fn load(&self, flow_id: &str) -> Result<Option<Snapshot>, CheckpointError> {
        let path = self.path_for(flow_id)?;
        match fs::read(&path) {
            Ok(bytes) => Snapshot::from_bytes(&bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn delete(&self, flow_id: &str) -> Result<bool, CheckpointError> {
        let path = self.path_for(flow_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_context() -> Context {
        let ctx = Context::new();
        ctx.set("count", 3);
        ctx.set("nested", json!({"tags": ["a", "b"], "score": 0.5}));
        ctx.set("empty", Value::Null);
        ctx
    }

    #[test]
    fn test_capture_and_restore_round_trip() {
        let ctx = sample_context();
        let snapshot = Snapshot::capture("run-1", &ctx).with_metadata("stage", "after-load");

        let bytes = snapshot.to_bytes().unwrap();
        let decoded = Snapshot::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, snapshot);

        let restored = decoded.restore();
        assert_eq!(restored.to_map(), ctx.to_map());
        assert!(!restored.same_as(&ctx));
    }

    #[test]
    fn test_restore_into_overwrites_shared_keys() {
        let snapshot = Snapshot::capture("run-1", &sample_context());
        let ctx = Context::new();
        ctx.set("count", 99);
        ctx.set("extra", true);
        snapshot.restore_into(&ctx);
        assert_eq!(ctx.get("count"), Some(json!(3)));
        assert_eq!(ctx.get("extra"), Some(json!(true)));
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemorySnapshotStore::new();
        assert!(store.load("missing").unwrap().is_none());

        store.save(&Snapshot::capture("b", &sample_context())).unwrap();
        store.save(&Snapshot::capture("a", &Context::new())).unwrap();
        assert_eq!(store.list().unwrap(), vec!["a", "b"]);

        let loaded = store.load("b").unwrap().unwrap();
        assert_eq!(loaded.data.get("count"), Some(&json!(3)));
        assert!(store.delete("b").unwrap());
        assert!(!store.delete("b").unwrap());
    }

    #[test]
    fn test_file_store_persists_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("snapshots")).unwrap();

        let snapshot = Snapshot::capture("flow_42", &sample_context());
        store.save(&snapshot).unwrap();
        assert_eq!(store.list().unwrap(), vec!["flow_42"]);

        // a second store on the same directory sees the file
        let reopened = FileSnapshotStore::new(store.dir()).unwrap();
        assert_eq!(reopened.load("flow_42").unwrap(), Some(snapshot));
        assert!(reopened.load("other").unwrap().is_none());

        assert!(reopened.delete("flow_42").unwrap());
        assert!(reopened.list().unwrap().is_empty());
    }

    #[test]
    fn test_float_values_survive_round_trip() {
        let floats = [
            985.6906946328695,
            212.91890726713459,
            479.60756426982596,
            0.1 + 0.2,
            f64::MIN_POSITIVE,
        ];
        let ctx = Context::new();
        for (i, f) in floats.iter().enumerate() {
            ctx.set(format!("f{}", i), json!(f));
        }
        let snapshot = Snapshot::capture("floats", &ctx);

        let check = |restored: &Context| {
            for (i, f) in floats.iter().enumerate() {
                let value = restored.get(&format!("f{}", i)).unwrap();
                assert_eq!(value, json!(f));
                assert_eq!(value.as_f64().unwrap().to_bits(), f.to_bits());
            }
        };

        let decoded = Snapshot::from_bytes(&snapshot.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
        check(&decoded.restore());

        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path()).unwrap();
        store.save(&snapshot).unwrap();
        let loaded = store.load("floats").unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        check(&loaded.restore());
    }

    #[test]
    fn test_file_store_rejects_unsafe_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path()).unwrap();
        let snapshot = Snapshot::capture("../escape", &Context::new());
        assert!(matches!(store.save(&snapshot), Err(CheckpointError::Store(_))));
        assert!(matches!(store.load(""), Err(CheckpointError::Store(_))));
    }
}
