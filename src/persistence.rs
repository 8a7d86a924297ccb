//! Pluggable persistence for mirroring state outside the store.
//!
//! Persistence is best-effort: saves happen after the in-memory commit
//! and their failures are reported, never propagated. A load failure at
//! construction falls back to the explicit initial state.

use crate::error::{Result, StoreError};
use crate::value::{Map, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Save/load/clear capability for a serialized state subset.
///
/// The payload is the JSON text of the filtered state under the
/// configured persistence key. `load` must be side-effect-idempotent.
pub trait PersistenceAdapter: Send + Sync {
    fn save(&self, key: &str, payload: &str) -> Result<()>;
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn clear(&self, key: &str) -> Result<()>;
}

/// In-memory adapter for tests and ephemeral stores.
pub struct MemoryAdapter {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistenceAdapter for MemoryAdapter {
    fn save(&self, key: &str, payload: &str) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), payload.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// File-backed adapter: one `<key>.json` file per key under a base
/// directory. The local-storage analog for native processes.
pub struct FileAdapter {
    dir: PathBuf,
}

impl FileAdapter {
    /// Create the adapter, ensuring the base directory exists.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl PersistenceAdapter for FileAdapter {
    fn save(&self, key: &str, payload: &str) -> Result<()> {
        let mut file = File::create(self.entry_path(key))?;
        file.write_all(payload.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn clear(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Connects the store to an adapter: filters the state down to the
/// persistent top-level keys, serializes, and absorbs every adapter
/// failure.
pub struct PersistenceBridge {
    adapter: Arc<dyn PersistenceAdapter>,
    key: String,
    persistent_keys: Option<Vec<String>>,
}

impl PersistenceBridge {
    pub fn new(
        adapter: Arc<dyn PersistenceAdapter>,
        key: String,
        persistent_keys: Option<Vec<String>>,
    ) -> Self {
        Self {
            adapter,
            key,
            persistent_keys,
        }
    }

    /// Mirror the state subset. Fire-and-forget: failures are reported
    /// and swallowed so the in-memory update is never blocked.
    pub fn save(&self, state: &Value) {
        let subset = self.filter(state);
        match serde_json::to_string(&subset) {
            Ok(payload) => {
                if let Err(e) = self.adapter.save(&self.key, &payload) {
                    warn!(key = %self.key, error = %e, "persistence save failed");
                }
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "state subset not serializable");
            }
        }
    }

    /// Load the mirrored state, if any. Failures are reported and
    /// treated as "nothing persisted".
    pub fn load(&self) -> Option<Value> {
        match self.adapter.load(&self.key) {
            Ok(Some(payload)) => match serde_json::from_str::<serde_json::Value>(&payload) {
                Ok(json) => Some(Value::from(json)),
                Err(e) => {
                    warn!(key = %self.key, error = %e, "persisted state is malformed, ignoring");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %self.key, error = %e, "persistence load failed");
                None
            }
        }
    }

    /// Drop the mirrored state (used by reset).
    pub fn clear(&self) {
        if let Err(e) = self.adapter.clear(&self.key) {
            warn!(key = %self.key, error = %e, "persistence clear failed");
        }
    }

    fn filter(&self, state: &Value) -> Value {
        match (&self.persistent_keys, state) {
            (Some(keys), Value::Object(map)) => {
                let filtered: Map = keys
                    .iter()
                    .filter_map(|k| map.get(k).map(|v| (k.clone(), v.clone())))
                    .collect();
                Value::Object(Arc::new(filtered))
            }
            _ => state.clone(),
        }
    }
}

/// Adapter error constructor helper for implementations outside this
/// crate.
pub fn adapter_error(message: impl Into<String>) -> StoreError {
    StoreError::Persistence(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_memory_adapter_roundtrip() {
        let adapter = MemoryAdapter::new();
        adapter.save("k", "{\"a\":1}").unwrap();
        assert_eq!(adapter.load("k").unwrap().as_deref(), Some("{\"a\":1}"));

        adapter.clear("k").unwrap();
        assert_eq!(adapter.load("k").unwrap(), None);
        // Clearing an absent key is fine.
        adapter.clear("k").unwrap();
    }

    #[test]
    fn test_file_adapter_roundtrip() {
        let dir = TempDir::new().unwrap();
        let adapter = FileAdapter::new(dir.path().join("persist")).unwrap();

        assert_eq!(adapter.load("app_state").unwrap(), None);

        adapter.save("app_state", "{\"count\":2}").unwrap();
        assert_eq!(
            adapter.load("app_state").unwrap().as_deref(),
            Some("{\"count\":2}")
        );

        adapter.clear("app_state").unwrap();
        assert_eq!(adapter.load("app_state").unwrap(), None);
    }

    #[test]
    fn test_bridge_filters_persistent_keys() {
        let adapter = Arc::new(MemoryAdapter::new());
        let bridge = PersistenceBridge::new(
            adapter.clone(),
            "app_state".to_string(),
            Some(vec!["user".to_string()]),
        );

        let state = Value::from(json!({"user": {"name": "a"}, "session": {"token": "x"}}));
        bridge.save(&state);

        let loaded = bridge.load().unwrap();
        assert_eq!(loaded, Value::from(json!({"user": {"name": "a"}})));
    }

    #[test]
    fn test_bridge_load_tolerates_malformed_payload() {
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.save("app_state", "not json").unwrap();

        let bridge = PersistenceBridge::new(adapter, "app_state".to_string(), None);
        assert!(bridge.load().is_none());
    }

    #[test]
    fn test_bridge_save_absorbs_adapter_failure() {
        struct FailingAdapter;
        impl PersistenceAdapter for FailingAdapter {
            fn save(&self, _: &str, _: &str) -> Result<()> {
                Err(adapter_error("quota exceeded"))
            }
            fn load(&self, _: &str) -> Result<Option<String>> {
                Err(adapter_error("unavailable"))
            }
            fn clear(&self, _: &str) -> Result<()> {
                Err(adapter_error("unavailable"))
            }
        }

        let bridge = PersistenceBridge::new(Arc::new(FailingAdapter), "k".to_string(), None);
        // None of these panic or propagate.
        bridge.save(&Value::from(json!({"a": 1})));
        assert!(bridge.load().is_none());
        bridge.clear();
    }
}
