//! Change detection for updates.
//!
//! The diff is targeted, not exhaustive: only the explicitly updated
//! paths, plus subscribed paths beneath them, are compared between the
//! old and new snapshots. Update cost is bounded by the number of
//! touched paths and their depth, independent of total state size.

use crate::path::Path;
use crate::value::Value;
use std::collections::HashSet;

/// The set of paths whose values differ after an update, plus every
/// ancestor of each such path (including the root), so an observer of
/// `"user"` matches when `"user.name"` changes.
#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    /// Paths that were directly detected as changed, in detection order.
    changed: Vec<Path>,
    /// Changed paths plus all of their ancestors.
    members: HashSet<Path>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a changed path, filling in its ancestors.
    pub fn insert(&mut self, path: Path) {
        for ancestor in path.ancestors() {
            self.members.insert(ancestor);
        }
        if self.members.insert(path.clone()) {
            self.changed.push(path);
        }
    }

    /// Membership test used for subscription matching: `true` for changed
    /// paths and their ancestors.
    pub fn contains(&self, path: &Path) -> bool {
        self.members.contains(path)
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    /// Directly changed paths, without the ancestor fill-ins.
    pub fn changed_paths(&self) -> &[Path] {
        &self.changed
    }

    /// All member paths, ancestors included. Iteration order is arbitrary.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }
}

/// Compute the change set for an update.
///
/// `updated` are the paths the update wrote. `observed` are paths
/// declared by subscriptions; any of them lying strictly beneath an
/// updated path is also compared, so replacing `"user"` wholesale still
/// surfaces a change at `"user.name"` for its observers. Comparison is
/// `Value::same`: reference equality for containers, value equality for
/// scalars.
pub fn diff(old: &Value, new: &Value, updated: &[Path], observed: &[Path]) -> ChangeSet {
    let mut changes = ChangeSet::new();

    for path in updated {
        if differs(old, new, path) {
            changes.insert(path.clone());
        }
    }

    for path in observed {
        if changes.contains(path) {
            continue;
        }
        let descends = updated
            .iter()
            .any(|u| path.starts_with(u) && path.len() > u.len());
        if descends && differs(old, new, path) {
            changes.insert(path.clone());
        }
    }

    changes
}

fn differs(old: &Value, new: &Value, path: &Path) -> bool {
    match (old.get_path(path), new.get_path(path)) {
        (Some(a), Some(b)) => !a.same(b),
        (None, None) => false,
        _ => true,
    }
}
