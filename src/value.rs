//! The state tree value type.
//!
//! State is an arbitrarily nested tree of mappings, sequences, and scalar
//! leaves. Containers are reference-counted so that immutable updates can
//! share every untouched subtree with the previous snapshot, and so that
//! "did this subtree change" is a pointer comparison rather than a walk.

use crate::path::{Key, Path};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;

/// Mapping node payload.
pub type Map = HashMap<String, Value>;

/// A node in the state tree.
///
/// Scalars are stored inline; arrays and objects are behind `Arc` so a
/// clone of a `Value` is a cheap structural copy, never a deep one.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Arc<Vec<Value>>),
    Object(Arc<Map>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    /// Build an object from key/value pairs.
    pub fn object(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Value::Object(Arc::new(entries.into_iter().collect()))
    }

    /// Build an array from values.
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Arc::new(items.into_iter().collect()))
    }

    /// The change-detection predicate: pointer equality for containers,
    /// value equality for scalars.
    ///
    /// Replacing a nested object with a structurally identical but newly
    /// built one counts as a change. Callers rely on that shallow-immutable
    /// contract; use `==` for deep structural comparison instead.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Resolve a path against this tree.
    ///
    /// An absent intermediate key is a valid "no value yet" state and
    /// returns `None`, never an error.
    pub fn get_path(&self, path: &Path) -> Option<&Value> {
        let mut current = self;
        for key in path.keys() {
            current = match (key, current) {
                (Key::Field(name), Value::Object(map)) => map.get(name)?,
                (Key::Index(i), Value::Array(items)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Return a new tree with `value` placed at `path`.
    ///
    /// Only the spine along `path` is copied; every sibling subtree is
    /// shared by reference with `self`. Missing intermediate steps become
    /// fresh objects (a scalar in the way is replaced). Integer keys into
    /// arrays replace in-bounds elements, append at `len`, and pad with
    /// `Null` beyond that. The empty path replaces the whole tree.
    pub fn set_path(&self, path: &Path, value: Value) -> Value {
        self.set_keys(path.keys(), value)
    }

    fn set_keys(&self, keys: &[Key], value: Value) -> Value {
        let Some((head, rest)) = keys.split_first() else {
            return value;
        };

        match head {
            Key::Field(name) => {
                let mut map = match self {
                    Value::Object(existing) => Map::clone(existing),
                    _ => Map::new(),
                };
                let child = map.get(name).cloned().unwrap_or(Value::Null);
                map.insert(name.clone(), child.set_keys(rest, value));
                Value::Object(Arc::new(map))
            }
            Key::Index(i) => {
                let mut items = match self {
                    Value::Array(existing) => Vec::clone(existing),
                    _ => Vec::new(),
                };
                if *i >= items.len() {
                    items.resize(i + 1, Value::Null);
                }
                let child = std::mem::replace(&mut items[*i], Value::Null);
                items[*i] = child.set_keys(rest, value);
                Value::Array(Arc::new(items))
            }
        }
    }

    /// Fully detached deep copy: every container gets a fresh allocation,
    /// so the result shares nothing with `self` and never compares `same`.
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Array(items) => {
                Value::Array(Arc::new(items.iter().map(Value::deep_clone).collect()))
            }
            Value::Object(map) => Value::Object(Arc::new(
                map.iter().map(|(k, v)| (k.clone(), v.deep_clone())).collect(),
            )),
            scalar => scalar.clone(),
        }
    }

    /// Convert to a `serde_json::Value` for serialization boundaries.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(Arc::new(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(map) => Value::Object(Arc::new(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            )),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}
