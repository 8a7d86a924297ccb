//! Integration tests for the state store.

use pathstore::{
    BeforeOutcome, MemoryAdapter, Path, PersistenceAdapter, Selector, Store, StoreConfig, Update,
    UpdateOptions, UpdateOutcome, Value,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn path(raw: &str) -> Path {
    Path::parse(raw).unwrap()
}

// --- Realistic Workflow Tests ---

#[test]
fn test_counter_workflow() {
    init_tracing();
    let store = Store::new(Value::from(json!({"count": 0})));

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    store.subscribe(move |event| {
        assert_eq!(
            event.state.get_path(&path("count")),
            Some(&Value::Int(1))
        );
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let summary = store.set_state(Update::set("count", 1)).unwrap();

    assert_eq!(summary.outcome, UpdateOutcome::Applied);
    assert_eq!(store.get_state_at("count").unwrap(), Some(Value::Int(1)));
    assert!(summary.changes.contains(&path("count")));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_todo_list_workflow() {
    let store = Store::new(Value::from(json!({
        "todos": [{"id": 1, "completed": false}],
        "meta": {"owner": "ada"},
    })));

    let todos_before = store.get_state_at("todos").unwrap().unwrap();
    let meta_before = store.get_state_at("meta").unwrap().unwrap();

    store
        .set_state(Update::compute(|state| {
            let mut items: Vec<Value> = state
                .get_path(&Path::parse("todos").unwrap())
                .and_then(Value::as_array)
                .map(<[Value]>::to_vec)
                .unwrap_or_default();
            items.push(Value::from(json!({"id": 2, "completed": false})));
            vec![("todos".to_string(), Value::array(items))]
        }))
        .unwrap();

    let todos_after = store.get_state_at("todos").unwrap().unwrap();
    assert_eq!(todos_after.as_array().unwrap().len(), 2);

    // The pre-update array is untouched by the immutable update.
    assert_eq!(todos_before.as_array().unwrap().len(), 1);
    // Subtrees off the updated spine are shared by reference.
    let meta_after = store.get_state_at("meta").unwrap().unwrap();
    assert!(meta_before.same(&meta_after));
}

#[test]
fn test_user_validation_middleware() {
    let store = Store::new(Value::from(json!({"user": {"name": "ada"}})));

    store.add_before_update(|update, _state| {
        for (key, value) in &update {
            if key == "user" {
                let has_name = value
                    .get_path(&Path::parse("name").unwrap())
                    .map(|v| !v.is_null())
                    .unwrap_or(false);
                if !has_name {
                    return BeforeOutcome::reject("user requires a name");
                }
            }
        }
        BeforeOutcome::Continue(update)
    });

    let before = store.get_state();
    let summary = store
        .set_state(Update::from_json(json!({"user": {}})).unwrap())
        .unwrap();

    assert!(matches!(summary.outcome, UpdateOutcome::Rejected { .. }));
    assert!(store.get_state().same(&before));

    // A well-formed user passes the same chain.
    let summary = store
        .set_state(Update::from_json(json!({"user": {"name": "grace"}})).unwrap())
        .unwrap();
    assert_eq!(summary.outcome, UpdateOutcome::Applied);
    assert_eq!(
        store.get_state_at("user.name").unwrap(),
        Some(Value::from("grace"))
    );
}

#[test]
fn test_selector_caching_workflow() {
    let store = Store::new(Value::from(json!({
        "todos": [
            {"id": 1, "completed": true},
            {"id": 2, "completed": false},
        ],
        "filter": "all",
    })));

    let completed = Selector::new(|state: &Value| {
        Value::array(
            state
                .get_path(&Path::parse("todos").unwrap())
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter(|t| {
                            t.get_path(&Path::parse("completed").unwrap())
                                .and_then(Value::as_bool)
                                .unwrap_or(false)
                        })
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
        )
    });

    let first = store.select(&completed);
    let second = store.select(&completed);
    // No state change between calls: the identical cached allocation.
    assert!(first.same(&second));
    assert_eq!(first.as_array().unwrap().len(), 1);

    // An unrelated update commits a new snapshot reference, so the
    // selector recomputes into a fresh (structurally equal) result.
    store.set_state(Update::set("filter", "active")).unwrap();
    let third = store.select(&completed);
    assert!(!second.same(&third));
    assert_eq!(second, third);
}

#[test]
fn test_multiple_subscriptions_same_pattern_are_independent() {
    let store = Store::new(Value::from(json!({"count": 0})));
    let fired = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let counter = fired.clone();
        store
            .subscribe_path("count", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    store.set_state(Update::set("count", 1)).unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 3);
}

#[test]
fn test_unsubscribe_stops_notifications() {
    let store = Store::new(Value::from(json!({"count": 0})));
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = fired.clone();
    let id = store.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    store.set_state(Update::set("count", 1)).unwrap();
    assert!(store.unsubscribe(id));

    store.set_state(Update::set("count", 2)).unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // Repeated unsubscribe is a no-op.
    assert!(!store.unsubscribe(id));
}

#[test]
fn test_multi_path_subscription() {
    let store = Store::new(Value::from(json!({"a": 0, "b": 0, "c": 0})));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    store
        .subscribe_paths(&["a", "b"], move |event| {
            sink.lock().push(event.path.clone().unwrap().to_string());
        })
        .unwrap();

    store.set_state(Update::set("a", 1)).unwrap();
    store.set_state(Update::set("c", 1)).unwrap();
    store.set_state(Update::set("b", 1)).unwrap();

    assert_eq!(*seen.lock(), vec!["a", "b"]);
}

// --- Persistence Workflows ---

#[test]
fn test_persistence_roundtrip_across_stores() {
    let adapter = Arc::new(MemoryAdapter::new());

    {
        let store = Store::with_config(
            Value::from(json!({"count": 0, "name": "a"})),
            StoreConfig {
                enable_persistence: true,
                persistence_adapter: Some(adapter.clone() as Arc<dyn PersistenceAdapter>),
                ..Default::default()
            },
        );
        store.set_state(Update::set("count", 42)).unwrap();
    }

    // A fresh store over the same adapter seeds from the mirror, with
    // loaded values taking precedence over the explicit initial state.
    let store = Store::with_config(
        Value::from(json!({"count": 0, "name": "a"})),
        StoreConfig {
            enable_persistence: true,
            persistence_adapter: Some(adapter.clone() as Arc<dyn PersistenceAdapter>),
            ..Default::default()
        },
    );
    assert_eq!(store.get_state_at("count").unwrap(), Some(Value::Int(42)));
    assert_eq!(store.get_state_at("name").unwrap(), Some(Value::from("a")));
}

#[test]
fn test_persistent_keys_filter_mirrored_subset() {
    let adapter = Arc::new(MemoryAdapter::new());
    let store = Store::with_config(
        Value::from(json!({"user": {"name": "a"}, "session": {"token": "t"}})),
        StoreConfig {
            enable_persistence: true,
            persistence_adapter: Some(adapter.clone() as Arc<dyn PersistenceAdapter>),
            persistent_keys: Some(vec!["user".to_string()]),
            ..Default::default()
        },
    );

    store.set_state(Update::set("user.name", "b")).unwrap();

    let payload = adapter.load("app_state").unwrap().unwrap();
    let mirrored: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(mirrored, json!({"user": {"name": "b"}}));
}

#[test]
fn test_file_persistence_workflow() {
    let dir = tempfile::TempDir::new().unwrap();
    let adapter = Arc::new(pathstore::FileAdapter::new(dir.path().join("state")).unwrap());

    {
        let store = Store::with_config(
            Value::from(json!({"theme": "light"})),
            StoreConfig {
                enable_persistence: true,
                persistence_adapter: Some(adapter.clone() as Arc<dyn PersistenceAdapter>),
                persistence_key: "prefs".to_string(),
                ..Default::default()
            },
        );
        store.set_state(Update::set("theme", "dark")).unwrap();
    }

    assert!(dir.path().join("state").join("prefs.json").exists());

    let store = Store::with_config(
        Value::from(json!({"theme": "light"})),
        StoreConfig {
            enable_persistence: true,
            persistence_adapter: Some(adapter as Arc<dyn PersistenceAdapter>),
            persistence_key: "prefs".to_string(),
            ..Default::default()
        },
    );
    assert_eq!(
        store.get_state_at("theme").unwrap(),
        Some(Value::from("dark"))
    );
}

// --- Watchers ---

#[test]
fn test_watch_from_another_thread() {
    let store = Arc::new(Store::new(Value::from(json!({"count": 0}))));
    let handle = store.watch_path("count", 16).unwrap();

    let consumer = std::thread::spawn(move || {
        let event = handle
            .recv_timeout(std::time::Duration::from_secs(1))
            .unwrap();
        event.value.clone()
    });

    store.set_state(Update::set("count", 9)).unwrap();
    assert_eq!(consumer.join().unwrap(), Some(Value::Int(9)));
}

#[test]
fn test_silent_update_skips_watchers_too() {
    let store = Store::new(Value::from(json!({"count": 0})));
    let handle = store.watch(8);

    store
        .set_state_with(Update::set("count", 1), UpdateOptions::silent())
        .unwrap();

    assert!(handle.try_recv().is_err());
}

// --- Serde Fixtures ---

#[test]
fn test_typed_fixture_through_serde() {
    #[derive(serde::Serialize)]
    struct Prefs {
        theme: String,
        font_size: u32,
    }

    let prefs = Prefs {
        theme: "dark".to_string(),
        font_size: 14,
    };

    let store = Store::new(Value::from(json!({})));
    store
        .set_state(Update::set(
            "prefs",
            Value::from(serde_json::to_value(&prefs).unwrap()),
        ))
        .unwrap();

    assert_eq!(
        store.get_state_at("prefs.theme").unwrap(),
        Some(Value::from("dark"))
    );
    assert_eq!(
        store.get_state_at("prefs.font_size").unwrap(),
        Some(Value::Int(14))
    );
}
