//! Dotted-path parsing and addressing.
//!
//! A path is an ordered sequence of keys identifying a location in the
//! state tree: `"user.preferences.theme"` parses to three field keys,
//! `"todos.0.done"` mixes fields with an array index. The empty path
//! addresses the whole state.

use crate::error::{Result, StoreError};
use std::fmt;

/// One step of a path: a mapping field or an array index.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Field(String),
    Index(usize),
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => write!(f, "Field({name:?})"),
            Key::Index(i) => write!(f, "Index({i})"),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => f.write_str(name),
            Key::Index(i) => write!(f, "{i}"),
        }
    }
}

/// An ordered key sequence addressing a location in the state tree.
///
/// Two paths are related if one is a prefix of the other. `Path::root()`
/// (the empty sequence) addresses the whole state.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<Key>);

impl Path {
    /// The empty path, addressing the whole state.
    pub fn root() -> Self {
        Path(Vec::new())
    }

    /// Parse a dotted descriptor. All-digit segments become array indices.
    ///
    /// Empty input and empty segments (`"a..b"`, `".a"`, `"a."`) are
    /// malformed; callers address the root by omitting the path, not by
    /// passing an empty string.
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(StoreError::InvalidPath("empty path".to_string()));
        }

        let mut keys = Vec::new();
        for segment in input.split('.') {
            if segment.is_empty() {
                return Err(StoreError::InvalidPath(format!(
                    "empty segment in {input:?}"
                )));
            }
            if segment.bytes().all(|b| b.is_ascii_digit()) {
                let index = segment.parse::<usize>().map_err(|_| {
                    StoreError::InvalidPath(format!("index out of range in {input:?}"))
                })?;
                keys.push(Key::Index(index));
            } else {
                keys.push(Key::Field(segment.to_string()));
            }
        }
        Ok(Path(keys))
    }

    /// Build a path from an explicit key sequence.
    pub fn from_keys(keys: impl IntoIterator<Item = Key>) -> Self {
        Path(keys.into_iter().collect())
    }

    pub fn keys(&self) -> &[Key] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The path one level up, or `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            None
        } else {
            Some(Path(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Every proper prefix of this path, shortest first, starting with
    /// the root.
    pub fn ancestors(&self) -> impl Iterator<Item = Path> + '_ {
        (0..self.0.len()).map(|end| Path(self.0[..end].to_vec()))
    }

    /// Prefix test: `true` when `prefix` is an ancestor of (or equal to)
    /// this path.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Extend with one more key.
    pub fn child(&self, key: Key) -> Path {
        let mut keys = self.0.clone();
        keys.push(key);
        Path(keys)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}
