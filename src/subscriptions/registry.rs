//! Subscription registry and dispatch.

use crate::changes::ChangeSet;
use crate::path::Path;
use crate::value::Value;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, warn};

use super::types::{
    ChangeCallback, ChangeEvent, PathPattern, PatternMatch, SubscriptionId, WatchHandle,
};

/// How a matching event reaches the subscriber.
#[derive(Clone)]
enum Delivery {
    /// Synchronous callback, invoked during dispatch.
    Callback(ChangeCallback),
    /// Bounded channel; the watcher is dropped if it falls behind.
    Channel(Sender<ChangeEvent>),
}

struct Subscription {
    pattern: PathPattern,
    delivery: Delivery,
}

/// Stores subscriptions keyed by path pattern and dispatches change sets
/// to them.
///
/// Subscriptions are kept in an ordered map keyed by their monotonic id,
/// so dispatch iterates in registration order. The lock is never held
/// while a callback runs; callbacks may subscribe and unsubscribe
/// re-entrantly.
pub struct SubscriptionRegistry {
    subscriptions: RwLock<BTreeMap<SubscriptionId, Subscription>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a callback subscription. Identical patterns are
    /// independent: each registration fires once per matching dispatch.
    pub fn subscribe(&self, pattern: PathPattern, callback: ChangeCallback) -> SubscriptionId {
        let id = self.allocate_id();
        self.subscriptions.write().insert(
            id,
            Subscription {
                pattern,
                delivery: Delivery::Callback(callback),
            },
        );
        id
    }

    /// Register a channel-backed watcher with the given buffer size.
    pub fn watch(&self, pattern: PathPattern, buffer: usize) -> WatchHandle {
        let id = self.allocate_id();
        let (sender, receiver) = bounded(buffer.max(1));
        self.subscriptions.write().insert(
            id,
            Subscription {
                pattern,
                delivery: Delivery::Channel(sender),
            },
        );
        WatchHandle { id, receiver }
    }

    /// Remove a subscription. Safe to call repeatedly: removing an id
    /// that is already gone is a no-op returning `false`.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions.write().remove(&id).is_some()
    }

    /// Remove every subscription (store teardown).
    pub fn clear(&self) {
        self.subscriptions.write().clear();
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Every path declared by a live subscription, deduplicated. The
    /// diff compares these beneath updated paths so observers of a
    /// subtree see changes when an ancestor is replaced wholesale.
    pub fn declared_paths(&self) -> Vec<Path> {
        let subscriptions = self.subscriptions.read();
        let mut seen = HashSet::new();
        let mut paths = Vec::new();
        for subscription in subscriptions.values() {
            for path in subscription.pattern.declared_paths() {
                if seen.insert(path.clone()) {
                    paths.push(path.clone());
                }
            }
        }
        paths
    }

    /// Dispatch a change set against every live subscription, in
    /// registration order. Returns the number of deliveries.
    ///
    /// A panicking callback is reported and the rest of the dispatch
    /// continues. Watchers whose buffer is full (or whose receiver is
    /// gone) are removed. Subscriptions unsubscribed by an earlier
    /// callback in the same dispatch are skipped.
    pub fn dispatch(&self, changes: &ChangeSet, state: &Value) -> usize {
        if changes.is_empty() {
            return 0;
        }

        let snapshot: Vec<(SubscriptionId, PathPattern, Delivery)> = self
            .subscriptions
            .read()
            .iter()
            .map(|(id, s)| (*id, s.pattern.clone(), s.delivery.clone()))
            .collect();

        let mut delivered = 0;
        let mut dead_watchers = Vec::new();

        for (id, pattern, delivery) in snapshot {
            if !self.subscriptions.read().contains_key(&id) {
                continue;
            }

            let event = match pattern.matches(changes) {
                None => continue,
                Some(PatternMatch::Whole) => ChangeEvent {
                    path: None,
                    value: None,
                    state: state.clone(),
                },
                Some(PatternMatch::At(path)) => ChangeEvent {
                    path: Some(path.clone()),
                    value: state.get_path(path).cloned(),
                    state: state.clone(),
                },
            };

            match delivery {
                Delivery::Callback(callback) => {
                    delivered += 1;
                    let result = catch_unwind(AssertUnwindSafe(|| (callback.as_ref())(&event)));
                    if result.is_err() {
                        error!(
                            subscription = id.0,
                            "subscriber callback panicked during dispatch"
                        );
                    }
                }
                Delivery::Channel(sender) => match sender.try_send(event) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                        dead_watchers.push(id);
                    }
                },
            }
        }

        if !dead_watchers.is_empty() {
            let mut subscriptions = self.subscriptions.write();
            for id in dead_watchers {
                if subscriptions.remove(&id).is_some() {
                    warn!(
                        subscription = id.0,
                        "watcher dropped: buffer full or receiver disconnected"
                    );
                }
            }
        }

        delivered
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
