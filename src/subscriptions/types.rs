//! Subscription types.

use crate::changes::ChangeSet;
use crate::path::Path;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Unique identifier for a subscription. Ids are allocated monotonically,
/// so ordering by id is registration order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

/// What a subscription observes.
#[derive(Clone, Debug, PartialEq)]
pub enum PathPattern {
    /// Whole-state observer: matches any non-empty change set.
    All,
    /// Matches when this path (or a descendant of it) changed.
    One(Path),
    /// Matches when any of these paths changed.
    Any(Vec<Path>),
}

/// Where in the pattern a change set matched.
pub(crate) enum PatternMatch<'a> {
    /// Whole-state pattern matched.
    Whole,
    /// A declared path matched.
    At(&'a Path),
}

impl PathPattern {
    /// Declared paths, for targeted descendant comparison in the diff.
    pub fn declared_paths(&self) -> &[Path] {
        match self {
            PathPattern::All => &[],
            PathPattern::One(path) => std::slice::from_ref(path),
            PathPattern::Any(paths) => paths,
        }
    }

    /// Match against a change set. The caller guarantees the set is
    /// non-empty.
    pub(crate) fn matches<'a>(&'a self, changes: &ChangeSet) -> Option<PatternMatch<'a>> {
        match self {
            PathPattern::All => Some(PatternMatch::Whole),
            PathPattern::One(path) => changes.contains(path).then_some(PatternMatch::At(path)),
            PathPattern::Any(paths) => paths
                .iter()
                .find(|p| changes.contains(p))
                .map(PatternMatch::At),
        }
    }
}

/// Delivered to a subscriber when its pattern matched a dispatch.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    /// The declared path that matched, `None` for whole-state observers.
    pub path: Option<Path>,
    /// The value resolved at `path` in the new state, if any.
    pub value: Option<Value>,
    /// The full new snapshot. Every callback in one dispatch observes
    /// the same snapshot.
    pub state: Value,
}

/// Subscriber callback. Shared so dispatch can run without holding the
/// registry lock.
pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Handle for a channel-backed watcher.
///
/// Events arrive on a bounded channel; a watcher that falls behind its
/// buffer is dropped from the registry.
pub struct WatchHandle {
    pub id: SubscriptionId,
    pub receiver: crossbeam_channel::Receiver<ChangeEvent>,
}

impl WatchHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<ChangeEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<ChangeEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<ChangeEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
