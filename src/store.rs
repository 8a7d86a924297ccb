//! Main Store struct tying all components together.

use crate::changes::{self, ChangeSet};
use crate::error::{Result, StoreError};
use crate::middleware::{AfterFlow, BeforeOutcome, MiddlewareId, Pipeline, UpdateMap};
use crate::path::{Key, Path};
use crate::persistence::{FileAdapter, MemoryAdapter, PersistenceAdapter, PersistenceBridge};
use crate::selector::Selector;
use crate::subscriptions::{
    ChangeEvent, PathPattern, SubscriptionId, SubscriptionRegistry, WatchHandle,
};
use crate::value::{Map, Value};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, warn};

/// Where the default file adapter mirrors state when persistence is
/// enabled without an injected adapter.
const DEFAULT_PERSISTENCE_DIR: &str = "./pathstore_data";

/// Store configuration.
#[derive(Clone)]
pub struct StoreConfig {
    /// Copy-on-read parity flag. The tree is persistent (shared
    /// subtrees are immutable by construction), so handed-out snapshots
    /// can never mutate store internals in either mode; callers wanting
    /// a detached tree use [`Store::get_state_deep`].
    pub immutable: bool,

    /// Mirror state through the persistence adapter after updates.
    pub enable_persistence: bool,

    /// Key the mirrored state is stored under.
    pub persistence_key: String,

    /// Adapter to mirror through. Defaults to a file adapter under
    /// `./pathstore_data` when persistence is enabled.
    pub persistence_adapter: Option<Arc<dyn PersistenceAdapter>>,

    /// Top-level keys to persist. `None` persists the whole state.
    pub persistent_keys: Option<Vec<String>>,

    /// Verbose diagnostic logging of every update.
    pub debug: bool,

    /// Capacity of the parsed-path cache.
    pub path_cache_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            immutable: true,
            enable_persistence: false,
            persistence_key: "app_state".to_string(),
            persistence_adapter: None,
            persistent_keys: None,
            debug: false,
            path_cache_size: 256,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("immutable", &self.immutable)
            .field("enable_persistence", &self.enable_persistence)
            .field("persistence_key", &self.persistence_key)
            .field(
                "persistence_adapter",
                &self.persistence_adapter.as_ref().map(|_| "<adapter>"),
            )
            .field("persistent_keys", &self.persistent_keys)
            .field("debug", &self.debug)
            .field("path_cache_size", &self.path_cache_size)
            .finish()
    }
}

/// Per-update options.
#[derive(Clone, Copy, Debug)]
pub struct UpdateOptions {
    /// Change state without notifying subscribers.
    pub silent: bool,
    /// Mirror through the persistence adapter (when enabled).
    pub persist: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            silent: false,
            persist: true,
        }
    }
}

impl UpdateOptions {
    /// Update without subscriber dispatch.
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    /// Update without mirroring to persistence.
    pub fn no_persist() -> Self {
        Self {
            persist: false,
            ..Self::default()
        }
    }
}

/// An update to apply: either a concrete partial mapping, or a function
/// of the pre-update state producing one.
pub enum Update {
    Map(UpdateMap),
    Compute(Box<dyn FnOnce(&Value) -> UpdateMap + Send>),
}

impl Update {
    /// Single-entry update.
    pub fn set(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Update::Map(vec![(key.into(), value.into())])
    }

    /// Multi-entry update, applied in order.
    pub fn entries(entries: UpdateMap) -> Self {
        Update::Map(entries)
    }

    /// Update computed from the pre-update state.
    pub fn compute(f: impl FnOnce(&Value) -> UpdateMap + Send + 'static) -> Self {
        Update::Compute(Box::new(f))
    }

    /// Build from a JSON object whose keys are dotted paths or top-level
    /// keys. Any other JSON shape is a malformed update.
    pub fn from_json(payload: serde_json::Value) -> Result<Self> {
        match payload {
            serde_json::Value::Object(map) => Ok(Update::Map(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            )),
            other => Err(StoreError::InvalidUpdate(format!(
                "update payload must be an object, got {other}"
            ))),
        }
    }

    fn resolve(self, state: &Value) -> UpdateMap {
        match self {
            Update::Map(entries) => entries,
            Update::Compute(f) => f(state),
        }
    }
}

impl From<UpdateMap> for Update {
    fn from(entries: UpdateMap) -> Self {
        Update::Map(entries)
    }
}

/// How an update concluded.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateOutcome {
    /// Committed, persisted, dispatched.
    Applied,
    /// Every written value already compared equal: nothing committed,
    /// nobody notified.
    NoChange,
    /// A `before_update` middleware declined the update. Not an error:
    /// state is unchanged and no subscriber ran.
    Rejected { reason: Option<String> },
    /// Issued re-entrantly from inside a dispatch; deferred until the
    /// outer update completes.
    Queued,
}

/// Result of a `set_state`/`reset_state` call.
#[derive(Clone, Debug)]
pub struct UpdateSummary {
    /// The post-update snapshot (the unchanged one for
    /// `Rejected`/`NoChange`/`Queued`).
    pub state: Value,
    pub changes: ChangeSet,
    pub outcome: UpdateOutcome,
}

enum Pending {
    Set {
        update: Update,
        options: UpdateOptions,
    },
    Reset {
        state: Option<Value>,
        options: UpdateOptions,
    },
}

/// The path-addressed reactive state store.
///
/// Holds a single authoritative snapshot of nested state; all mutation
/// flows through [`Store::set_state`], which diffs against the previous
/// snapshot and notifies matching subscribers in a well-defined order:
/// before-middleware, snapshot swap, persistence, dispatch,
/// after-middleware.
///
/// The snapshot swap is one reference assignment, so readers (including
/// subscribers mid-dispatch) always observe a complete tree. Updates
/// issued from inside a subscriber or hook are queued FIFO and applied
/// after the outer update's dispatch completes.
pub struct Store {
    config: StoreConfig,

    /// The explicit initial state, kept for resets.
    initial: Value,

    /// Current authoritative snapshot.
    current: RwLock<Value>,

    subscriptions: SubscriptionRegistry,
    middleware: Pipeline,
    persistence: Option<PersistenceBridge>,

    /// Cache of parsed dotted-path strings.
    path_cache: Mutex<LruCache<String, Path>>,

    /// Serializes writers across threads.
    update_gate: Mutex<()>,

    /// Thread currently inside the update sequence, for re-entrancy
    /// detection.
    update_owner: Mutex<Option<ThreadId>>,

    /// Updates deferred from inside a dispatch, applied FIFO.
    queued: Mutex<VecDeque<Pending>>,
}

impl Store {
    /// Create a store with the default configuration.
    pub fn new(initial: Value) -> Self {
        Self::with_config(initial, StoreConfig::default())
    }

    /// Create a store. With persistence enabled, previously mirrored
    /// state is loaded once and merged over the explicit initial state
    /// (loaded values take precedence); a load failure falls back to
    /// the initial state.
    pub fn with_config(initial: Value, config: StoreConfig) -> Self {
        let persistence = if config.enable_persistence {
            let adapter = match config.persistence_adapter.clone() {
                Some(adapter) => adapter,
                None => match FileAdapter::new(DEFAULT_PERSISTENCE_DIR) {
                    Ok(adapter) => Arc::new(adapter) as Arc<dyn PersistenceAdapter>,
                    Err(e) => {
                        warn!(error = %e, "file persistence unavailable, using in-memory adapter");
                        Arc::new(MemoryAdapter::new()) as Arc<dyn PersistenceAdapter>
                    }
                },
            };
            Some(PersistenceBridge::new(
                adapter,
                config.persistence_key.clone(),
                config.persistent_keys.clone(),
            ))
        } else {
            None
        };

        let mut state = initial.clone();
        if let Some(bridge) = &persistence {
            if let Some(loaded) = bridge.load() {
                state = merge_loaded(&state, &loaded);
            }
        }

        let cache_size = NonZeroUsize::new(config.path_cache_size.max(1)).unwrap();

        Self {
            config,
            initial,
            current: RwLock::new(state),
            subscriptions: SubscriptionRegistry::new(),
            middleware: Pipeline::new(),
            persistence,
            path_cache: Mutex::new(LruCache::new(cache_size)),
            update_gate: Mutex::new(()),
            update_owner: Mutex::new(None),
            queued: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // --- Reads ---

    /// The current snapshot. Cheap: containers are shared by reference
    /// with the store's tree, which cannot be mutated through the
    /// returned value.
    pub fn get_state(&self) -> Value {
        self.current.read().clone()
    }

    /// A fully detached copy of the current snapshot, sharing nothing
    /// with the store. With `immutable: false` the detachment is skipped
    /// and the cheap shared snapshot is returned instead (performance
    /// over isolation).
    pub fn get_state_deep(&self) -> Value {
        let state = self.current.read().clone();
        if self.config.immutable {
            state.deep_clone()
        } else {
            state
        }
    }

    /// Resolve a dotted path against the current snapshot. Absence is
    /// `Ok(None)`, not an error.
    pub fn get_state_at(&self, path: &str) -> Result<Option<Value>> {
        let path = self.parse_path(path)?;
        Ok(self.current.read().get_path(&path).cloned())
    }

    /// Resolve an already-parsed path against the current snapshot.
    pub fn get_state_path(&self, path: &Path) -> Option<Value> {
        self.current.read().get_path(path).cloned()
    }

    // --- Updates ---

    /// Apply an update with default options.
    pub fn set_state(&self, update: Update) -> Result<UpdateSummary> {
        self.set_state_with(update, UpdateOptions::default())
    }

    /// Apply an update.
    ///
    /// Runs the full sequence: resolve, before-middleware (which may
    /// transform or decline), fold the entries into a new snapshot,
    /// targeted diff, commit, persist, dispatch, after-middleware. A
    /// declined or value-equal update leaves state untouched and
    /// notifies nobody; both are reported through
    /// [`UpdateSummary::outcome`], not as errors.
    pub fn set_state_with(&self, update: Update, options: UpdateOptions) -> Result<UpdateSummary> {
        self.submit(Pending::Set { update, options })
    }

    /// Replace the entire tree. With `None`, restores the explicit
    /// initial state. Clears mirrored state when persistence is enabled
    /// and not suppressed, then dispatches with a change set of the
    /// root plus every top-level key that differs.
    pub fn reset_state(
        &self,
        new_state: Option<Value>,
        options: UpdateOptions,
    ) -> Result<UpdateSummary> {
        self.submit(Pending::Reset {
            state: new_state,
            options,
        })
    }

    fn submit(&self, pending: Pending) -> Result<UpdateSummary> {
        let me = thread::current().id();

        if *self.update_owner.lock() == Some(me) {
            // Re-entrant call from a hook or subscriber: defer until
            // the outer update's dispatch completes, preserving FIFO
            // order between queued updates.
            self.queued.lock().push_back(pending);
            if self.config.debug {
                debug!("re-entrant update queued");
            }
            return Ok(UpdateSummary {
                state: self.get_state(),
                changes: ChangeSet::new(),
                outcome: UpdateOutcome::Queued,
            });
        }

        let _gate = self.update_gate.lock();
        *self.update_owner.lock() = Some(me);

        let result = self.apply(pending);
        self.drain_queue();

        *self.update_owner.lock() = None;
        result
    }

    fn drain_queue(&self) {
        loop {
            let next = self.queued.lock().pop_front();
            let Some(pending) = next else { break };
            if let Err(e) = self.apply(pending) {
                warn!(error = %e, "queued update failed");
            }
        }
    }

    fn apply(&self, pending: Pending) -> Result<UpdateSummary> {
        match pending {
            Pending::Set { update, options } => self.apply_set(update, options),
            Pending::Reset { state, options } => self.apply_reset(state, options),
        }
    }

    fn apply_set(&self, update: Update, options: UpdateOptions) -> Result<UpdateSummary> {
        let old = self.get_state();

        let entries = update.resolve(&old);
        if self.config.debug {
            let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
            debug!(?keys, "update received");
        }

        let entries = match self.middleware.run_before(entries, &old) {
            BeforeOutcome::Continue(entries) => entries,
            BeforeOutcome::Reject(reason) => {
                if self.config.debug {
                    debug!(?reason, "update rejected by middleware");
                }
                return Ok(UpdateSummary {
                    state: old,
                    changes: ChangeSet::new(),
                    outcome: UpdateOutcome::Rejected { reason },
                });
            }
        };

        let mut next = old.clone();
        let mut updated = Vec::with_capacity(entries.len());
        for (raw, value) in entries {
            let path = self.parse_path(&raw)?;
            next = next.set_path(&path, value);
            updated.push(path);
        }

        let observed = self.subscriptions.declared_paths();
        let changes = changes::diff(&old, &next, &updated, &observed);
        if changes.is_empty() {
            if self.config.debug {
                debug!("no-op update: values unchanged");
            }
            return Ok(UpdateSummary {
                state: old,
                changes,
                outcome: UpdateOutcome::NoChange,
            });
        }

        // Commit: a single reference assignment. Readers see either the
        // old tree or this one, never a partial state.
        *self.current.write() = next.clone();

        if options.persist {
            if let Some(bridge) = &self.persistence {
                bridge.save(&next);
            }
        }

        if !options.silent {
            let delivered = self.subscriptions.dispatch(&changes, &next);
            if self.config.debug {
                debug!(
                    delivered,
                    changed = changes.changed_paths().len(),
                    "update dispatched"
                );
            }
        }

        self.middleware.run_after(&next, &changes);

        Ok(UpdateSummary {
            state: next,
            changes,
            outcome: UpdateOutcome::Applied,
        })
    }

    fn apply_reset(
        &self,
        new_state: Option<Value>,
        options: UpdateOptions,
    ) -> Result<UpdateSummary> {
        let old = self.get_state();
        let mut next = new_state.unwrap_or_else(|| self.initial.clone());

        // Resets pass through the before chain too: offer the new
        // top-level entries for transformation or veto. A non-mapping
        // root has nothing key-shaped to offer and skips the chain.
        if let Some(map) = next.as_object() {
            let entries: UpdateMap = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            match self.middleware.run_before(entries, &old) {
                BeforeOutcome::Continue(entries) => {
                    let mut rebuilt = Value::object([]);
                    for (raw, value) in entries {
                        let path = self.parse_path(&raw)?;
                        rebuilt = rebuilt.set_path(&path, value);
                    }
                    next = rebuilt;
                }
                BeforeOutcome::Reject(reason) => {
                    if self.config.debug {
                        debug!(?reason, "reset rejected by middleware");
                    }
                    return Ok(UpdateSummary {
                        state: old,
                        changes: ChangeSet::new(),
                        outcome: UpdateOutcome::Rejected { reason },
                    });
                }
            }
        }

        let mut changes = ChangeSet::new();
        changes.insert(Path::root());

        let mut top_keys: HashSet<String> = HashSet::new();
        if let Some(map) = old.as_object() {
            top_keys.extend(map.keys().cloned());
        }
        if let Some(map) = next.as_object() {
            top_keys.extend(map.keys().cloned());
        }
        for key in top_keys {
            let path = Path::from_keys([Key::Field(key)]);
            let differs = match (old.get_path(&path), next.get_path(&path)) {
                (Some(a), Some(b)) => !a.same(b),
                (None, None) => false,
                _ => true,
            };
            if differs {
                changes.insert(path);
            }
        }

        *self.current.write() = next.clone();

        if options.persist {
            if let Some(bridge) = &self.persistence {
                bridge.clear();
            }
        }

        if !options.silent {
            self.subscriptions.dispatch(&changes, &next);
        }

        self.middleware.run_after(&next, &changes);

        Ok(UpdateSummary {
            state: next,
            changes,
            outcome: UpdateOutcome::Applied,
        })
    }

    // --- Subscriptions ---

    /// Observe every change to the whole state.
    pub fn subscribe(
        &self,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscriptions
            .subscribe(PathPattern::All, Arc::new(callback))
    }

    /// Observe changes at (or beneath) one path.
    pub fn subscribe_path(
        &self,
        path: &str,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> Result<SubscriptionId> {
        let path = self.parse_path(path)?;
        Ok(self
            .subscriptions
            .subscribe(PathPattern::One(path), Arc::new(callback)))
    }

    /// Observe changes at any of several paths; the callback fires once
    /// per matching update with the first matching path.
    pub fn subscribe_paths(
        &self,
        paths: &[&str],
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> Result<SubscriptionId> {
        let parsed = paths
            .iter()
            .map(|p| self.parse_path(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(self
            .subscriptions
            .subscribe(PathPattern::Any(parsed), Arc::new(callback)))
    }

    /// Remove a subscription. Idempotent.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions.unsubscribe(id)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.subscription_count()
    }

    /// Drop every subscription (teardown).
    pub fn clear_subscriptions(&self) {
        self.subscriptions.clear();
    }

    /// Channel-backed whole-state watcher for consumers on other
    /// threads. A watcher that falls behind `buffer` events is dropped.
    pub fn watch(&self, buffer: usize) -> WatchHandle {
        self.subscriptions.watch(PathPattern::All, buffer)
    }

    /// Channel-backed watcher scoped to one path.
    pub fn watch_path(&self, path: &str, buffer: usize) -> Result<WatchHandle> {
        let path = self.parse_path(path)?;
        Ok(self.subscriptions.watch(PathPattern::One(path), buffer))
    }

    // --- Middleware ---

    /// Register a `before_update` hook; returns its removal id.
    pub fn add_before_update(
        &self,
        hook: impl Fn(UpdateMap, &Value) -> BeforeOutcome + Send + Sync + 'static,
    ) -> MiddlewareId {
        self.middleware.add_before(hook)
    }

    /// Register an `after_update` hook; returns its removal id.
    pub fn add_after_update(
        &self,
        hook: impl Fn(&Value, &ChangeSet) -> AfterFlow + Send + Sync + 'static,
    ) -> MiddlewareId {
        self.middleware.add_after(hook)
    }

    /// Remove a middleware entry from either chain. Idempotent.
    pub fn remove_middleware(&self, id: MiddlewareId) -> bool {
        self.middleware.remove(id)
    }

    // --- Selectors ---

    /// Evaluate a selector against the current snapshot.
    pub fn select<T: Clone>(&self, selector: &Selector<T>) -> T {
        selector.select(&self.get_state())
    }

    /// Evaluate an argument-taking selector against the current
    /// snapshot.
    pub fn select_with<T: Clone, A: PartialEq + Clone>(
        &self,
        selector: &Selector<T, A>,
        args: A,
    ) -> T {
        selector.select_with(&self.get_state(), args)
    }

    // --- Helpers ---

    fn parse_path(&self, raw: &str) -> Result<Path> {
        let mut cache = self.path_cache.lock();
        if let Some(path) = cache.get(raw) {
            return Ok(path.clone());
        }
        let path = Path::parse(raw)?;
        cache.put(raw.to_string(), path.clone());
        Ok(path)
    }
}

/// Merge mirrored state over the explicit initial state: loaded
/// top-level values win.
fn merge_loaded(initial: &Value, loaded: &Value) -> Value {
    match (initial, loaded) {
        (Value::Object(base), Value::Object(overlay)) => {
            let mut merged = Map::clone(base);
            for (k, v) in overlay.iter() {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(Arc::new(merged))
        }
        _ => loaded.clone(),
    }
}
