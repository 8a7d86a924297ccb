//! Process-wide registry of named stores.
//!
//! Replaces an implicit global default store with explicit, named
//! instances. Registering a name that is already taken returns the
//! existing instance (with a warning) rather than silently overwriting
//! it; the strict [`register`] fails fast instead.

use crate::error::{Result, StoreError};
use crate::store::Store;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::warn;

static STORES: OnceLock<RwLock<HashMap<String, Arc<Store>>>> = OnceLock::new();

fn stores() -> &'static RwLock<HashMap<String, Arc<Store>>> {
    STORES.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register a store under a name. Fails with [`StoreError::StoreExists`]
/// if the name is taken.
pub fn register(name: &str, store: Arc<Store>) -> Result<()> {
    let mut map = stores().write();
    if map.contains_key(name) {
        return Err(StoreError::StoreExists(name.to_string()));
    }
    map.insert(name.to_string(), store);
    Ok(())
}

/// Look up a store by name.
pub fn get(name: &str) -> Option<Arc<Store>> {
    stores().read().get(name).cloned()
}

/// Get the store registered under `name`, creating and registering it
/// with `init` if absent. If the name is already taken, the existing
/// instance is returned and the collision is reported.
pub fn get_or_insert_with(name: &str, init: impl FnOnce() -> Store) -> Arc<Store> {
    let mut map = stores().write();
    if let Some(existing) = map.get(name) {
        warn!(store = name, "store already registered, returning existing instance");
        return existing.clone();
    }
    let store = Arc::new(init());
    map.insert(name.to_string(), store.clone());
    store
}

/// Remove a store from the registry, returning it if present.
pub fn remove(name: &str) -> Option<Arc<Store>> {
    stores().write().remove(name)
}

/// Registered names.
pub fn names() -> Vec<String> {
    stores().read().keys().cloned().collect()
}

/// Drop every registration.
pub fn clear() {
    stores().write().clear();
}
