//! # Path Store
//!
//! A client-side reactive state container: it holds an application's
//! state tree, lets callers read and write it via dotted paths, and
//! notifies interested observers when the values they care about change.
//!
//! ## Core Concepts
//!
//! - **Paths**: Dotted descriptors (`"user.prefs.theme"`, `"todos.0"`)
//!   addressing locations in nested state
//! - **Updates**: Partial mappings (or functions of the current state)
//!   applied immutably, sharing every untouched subtree
//! - **Change sets**: The paths an update actually changed, plus their
//!   ancestors, computed by a targeted diff
//! - **Subscriptions**: Path-scoped or whole-state observers, notified
//!   synchronously in registration order
//! - **Middleware**: Before/after interceptors that can transform, veto,
//!   or observe every update
//!
//! ## Example
//!
//! ```ignore
//! use pathstore::{Store, Update, Value};
//! use serde_json::json;
//!
//! let store = Store::new(Value::from(json!({"count": 0})));
//!
//! store.subscribe_path("count", |event| {
//!     println!("count is now {:?}", event.value);
//! })?;
//!
//! store.set_state(Update::set("count", 1))?;
//! assert_eq!(store.get_state_at("count")?, Some(Value::Int(1)));
//! ```

pub mod changes;
pub mod error;
pub mod middleware;
pub mod path;
pub mod persistence;
pub mod registry;
pub mod selector;
pub mod store;
pub mod subscriptions;
pub mod value;

// Re-exports
pub use changes::ChangeSet;
pub use error::{Result, StoreError};
pub use middleware::{AfterFlow, BeforeOutcome, MiddlewareId, Pipeline, UpdateMap};
pub use path::{Key, Path};
pub use persistence::{FileAdapter, MemoryAdapter, PersistenceAdapter, PersistenceBridge};
pub use selector::Selector;
pub use store::{Store, StoreConfig, Update, UpdateOptions, UpdateOutcome, UpdateSummary};
pub use subscriptions::{
    ChangeCallback, ChangeEvent, PathPattern, SubscriptionId, SubscriptionRegistry, WatchHandle,
};
pub use value::{Map, Value};
