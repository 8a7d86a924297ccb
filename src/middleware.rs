//! The middleware pipeline around updates.
//!
//! Interceptors are keyed by stage: `before_update` hooks run ahead of
//! the snapshot swap and may transform or veto the pending update;
//! `after_update` hooks run after dispatch and are purely observational.
//! Hooks run in registration order; removal is by the id handed back at
//! registration.

use crate::changes::ChangeSet;
use crate::value::Value;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The pending update payload: dotted-path (or top-level) keys paired
/// with the values to place there, in application order.
pub type UpdateMap = Vec<(String, Value)>;

/// Identifier for a registered middleware entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MiddlewareId(pub u64);

impl fmt::Debug for MiddlewareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MiddlewareId({})", self.0)
    }
}

/// What a `before_update` hook decided.
///
/// Rejection is a normal declined-update outcome, not an error: the
/// first rejecting hook short-circuits the rest of the chain and the
/// update, and the store returns the unchanged state to the caller.
pub enum BeforeOutcome {
    /// Continue with this (possibly transformed) pending update.
    Continue(UpdateMap),
    /// Decline the update, optionally saying why.
    Reject(Option<String>),
}

impl BeforeOutcome {
    /// Convenience for hooks that decline with a reason.
    pub fn reject(reason: impl Into<String>) -> Self {
        BeforeOutcome::Reject(Some(reason.into()))
    }
}

/// What an `after_update` hook wants done with its own registration.
/// Any other outcome of the hook is ignored by the pipeline.
pub enum AfterFlow {
    Keep,
    /// Remove this entry once the chain completes.
    Detach,
}

type BeforeUpdateFn = dyn Fn(UpdateMap, &Value) -> BeforeOutcome + Send + Sync;
type AfterUpdateFn = dyn Fn(&Value, &ChangeSet) -> AfterFlow + Send + Sync;

struct BeforeEntry {
    id: MiddlewareId,
    hook: Arc<BeforeUpdateFn>,
}

struct AfterEntry {
    id: MiddlewareId,
    hook: Arc<AfterUpdateFn>,
}

/// Ordered before/after interceptor chains.
///
/// Locks are never held while a hook runs, so hooks may register or
/// remove middleware re-entrantly.
pub struct Pipeline {
    before: RwLock<Vec<BeforeEntry>>,
    after: RwLock<Vec<AfterEntry>>,
    next_id: AtomicU64,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            before: RwLock::new(Vec::new()),
            after: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> MiddlewareId {
        MiddlewareId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Append a hook to the `before_update` chain.
    pub fn add_before(
        &self,
        hook: impl Fn(UpdateMap, &Value) -> BeforeOutcome + Send + Sync + 'static,
    ) -> MiddlewareId {
        let id = self.allocate_id();
        self.before.write().push(BeforeEntry {
            id,
            hook: Arc::new(hook),
        });
        id
    }

    /// Append a hook to the `after_update` chain.
    pub fn add_after(
        &self,
        hook: impl Fn(&Value, &ChangeSet) -> AfterFlow + Send + Sync + 'static,
    ) -> MiddlewareId {
        let id = self.allocate_id();
        self.after.write().push(AfterEntry {
            id,
            hook: Arc::new(hook),
        });
        id
    }

    /// Remove the entry with this id from whichever chain holds it.
    /// Returns `false` if it was already gone.
    pub fn remove(&self, id: MiddlewareId) -> bool {
        {
            let mut before = self.before.write();
            let len = before.len();
            before.retain(|e| e.id != id);
            if before.len() != len {
                return true;
            }
        }
        let mut after = self.after.write();
        let len = after.len();
        after.retain(|e| e.id != id);
        after.len() != len
    }

    /// Run the `before_update` chain over a pending update.
    pub fn run_before(&self, update: UpdateMap, state: &Value) -> BeforeOutcome {
        let hooks: Vec<Arc<BeforeUpdateFn>> =
            self.before.read().iter().map(|e| e.hook.clone()).collect();

        let mut pending = update;
        for hook in hooks {
            match hook(pending, state) {
                BeforeOutcome::Continue(next) => pending = next,
                rejected @ BeforeOutcome::Reject(_) => return rejected,
            }
        }
        BeforeOutcome::Continue(pending)
    }

    /// Run the `after_update` chain, honoring `Detach` requests once the
    /// whole chain has completed.
    pub fn run_after(&self, state: &Value, changes: &ChangeSet) {
        let hooks: Vec<(MiddlewareId, Arc<AfterUpdateFn>)> = self
            .after
            .read()
            .iter()
            .map(|e| (e.id, e.hook.clone()))
            .collect();

        let mut detached = Vec::new();
        for (id, hook) in hooks {
            if let AfterFlow::Detach = hook(state, changes) {
                detached.push(id);
            }
        }

        if !detached.is_empty() {
            self.after.write().retain(|e| !detached.contains(&e.id));
        }
    }

    pub fn before_count(&self) -> usize {
        self.before.read().len()
    }

    pub fn after_count(&self) -> usize {
        self.after.read().len()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
