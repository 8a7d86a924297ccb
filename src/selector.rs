//! Memoized derived-state selectors.
//!
//! A selector caches one computation keyed by the state reference it
//! last saw (and the arguments, if any). Repeated evaluation under
//! unchanged state is O(1) and returns the cached result; callers must
//! not rely on recomputation happening while the state compares equal
//! under the configured equality.

use crate::value::Value;
use parking_lot::Mutex;

struct CacheEntry<T, A> {
    state: Value,
    args: A,
    result: T,
}

/// A memoized derivation from state (and optional arguments) to a
/// computed value.
///
/// The default state equality is [`Value::same`]: reference equality for
/// container roots, so any committed update invalidates the cache even
/// when the new tree is structurally identical.
pub struct Selector<T, A = ()> {
    compute: Box<dyn Fn(&Value, &A) -> T + Send + Sync>,
    state_eq: Box<dyn Fn(&Value, &Value) -> bool + Send + Sync>,
    cache: Mutex<Option<CacheEntry<T, A>>>,
}

impl<T: Clone> Selector<T, ()> {
    /// Selector over state alone.
    pub fn new(compute: impl Fn(&Value) -> T + Send + Sync + 'static) -> Self {
        Self::with_args(move |state, _: &()| compute(state))
    }

    /// Evaluate against a state snapshot.
    pub fn select(&self, state: &Value) -> T {
        self.select_with(state, ())
    }
}

impl<T: Clone, A: PartialEq + Clone> Selector<T, A> {
    /// Selector over state plus extra arguments. The cache holds the
    /// last `(state, args)` pair.
    pub fn with_args(compute: impl Fn(&Value, &A) -> T + Send + Sync + 'static) -> Self {
        Self {
            compute: Box::new(compute),
            state_eq: Box::new(|a, b| a.same(b)),
            cache: Mutex::new(None),
        }
    }

    /// Override the state equality predicate, e.g. with deep structural
    /// equality to suppress recomputation across no-op rebuilds.
    pub fn with_equality(
        mut self,
        eq: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.state_eq = Box::new(eq);
        self
    }

    /// Evaluate against a state snapshot with arguments.
    pub fn select_with(&self, state: &Value, args: A) -> T {
        let mut cache = self.cache.lock();

        if let Some(entry) = cache.as_ref() {
            if (self.state_eq)(&entry.state, state) && entry.args == args {
                return entry.result.clone();
            }
        }

        let result = (self.compute)(state, &args);
        *cache = Some(CacheEntry {
            state: state.clone(),
            args,
            result: result.clone(),
        });
        result
    }

    /// Drop the cached entry; the next evaluation recomputes.
    pub fn invalidate(&self) {
        *self.cache.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_cached_under_same_state() {
        let computed = Arc::new(AtomicUsize::new(0));
        let counter = computed.clone();
        let selector = Selector::new(move |state: &Value| {
            counter.fetch_add(1, Ordering::SeqCst);
            Value::array(
                state
                    .get_path(&crate::path::Path::parse("todos").unwrap())
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter(|t| {
                                t.get_path(&crate::path::Path::parse("done").unwrap())
                                    .and_then(Value::as_bool)
                                    .unwrap_or(false)
                            })
                            .cloned()
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default(),
            )
        });

        let state = Value::from(json!({"todos": [{"id": 1, "done": true}, {"id": 2, "done": false}]}));

        let first = selector.select(&state);
        let second = selector.select(&state);

        assert_eq!(computed.load(Ordering::SeqCst), 1);
        // The cached result is the identical allocation, not a rebuild.
        assert!(first.same(&second));
    }

    #[test]
    fn test_recomputes_on_new_state_reference() {
        let computed = Arc::new(AtomicUsize::new(0));
        let counter = computed.clone();
        let selector = Selector::new(move |_: &Value| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let state = Value::from(json!({"a": 1}));
        selector.select(&state);

        // Structurally identical but freshly built: recomputes.
        let rebuilt = Value::from(json!({"a": 1}));
        selector.select(&rebuilt);

        assert_eq!(computed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_args_participate_in_cache_key() {
        let computed = Arc::new(AtomicUsize::new(0));
        let counter = computed.clone();
        let selector = Selector::with_args(move |_: &Value, min: &i64| {
            counter.fetch_add(1, Ordering::SeqCst);
            *min * 2
        });

        let state = Value::from(json!({}));
        assert_eq!(selector.select_with(&state, 3), 6);
        assert_eq!(selector.select_with(&state, 3), 6);
        assert_eq!(computed.load(Ordering::SeqCst), 1);

        assert_eq!(selector.select_with(&state, 4), 8);
        assert_eq!(computed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_custom_equality_suppresses_recompute() {
        let computed = Arc::new(AtomicUsize::new(0));
        let counter = computed.clone();
        let selector = Selector::new(move |_: &Value| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .with_equality(|a, b| a == b);

        selector.select(&Value::from(json!({"a": 1})));
        selector.select(&Value::from(json!({"a": 1})));

        assert_eq!(computed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidate_forces_recompute() {
        let computed = Arc::new(AtomicUsize::new(0));
        let counter = computed.clone();
        let selector = Selector::new(move |_: &Value| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let state = Value::from(json!({}));
        selector.select(&state);
        selector.invalidate();
        selector.select(&state);

        assert_eq!(computed.load(Ordering::SeqCst), 2);
    }
}
