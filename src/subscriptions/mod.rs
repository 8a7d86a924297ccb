//! Subscriptions to state changes.
//!
//! Observers register a callback against a path pattern (a single path,
//! a set of paths, or the whole state) and are invoked synchronously, in
//! registration order, whenever a dispatched change set matches. A
//! failing callback is isolated and reported; it never blocks the rest
//! of the dispatch. Channel-backed watchers are also available for
//! consumers that drain events from another thread.
//!
//! # Example
//!
//! ```ignore
//! let registry = SubscriptionRegistry::new();
//!
//! let id = registry.subscribe(
//!     PathPattern::One(Path::parse("user.name")?),
//!     Arc::new(|event| println!("name is now {:?}", event.value)),
//! );
//!
//! registry.dispatch(&changes, &new_state);
//! registry.unsubscribe(id);
//! ```

mod registry;
mod types;

pub use registry::SubscriptionRegistry;
pub use types::{ChangeCallback, ChangeEvent, PathPattern, SubscriptionId, WatchHandle};
