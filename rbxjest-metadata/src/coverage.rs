// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An Istanbul-shaped coverage map.
///
/// Keys identify files; each value is a per-file coverage object carrying an embedded `path`
/// field. The special [`TOTAL_KEY`](Self::TOTAL_KEY) entry, if present, holds aggregate totals
/// rather than a file.
///
/// Entry order is preserved.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CoverageMap {
    entries: IndexMap<String, Value>,
}

impl CoverageMap {
    /// The key of the aggregate entry.
    pub const TOTAL_KEY: &'static str = "total";

    /// The field within each file entry that holds the file's path.
    pub const PATH_FIELD: &'static str = "path";

    /// Creates a new, empty coverage map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries, including the aggregate entry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entry for the given key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Returns true if an entry with the given key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts an entry, returning the previous entry for this key.
    ///
    /// A new key is appended at the end; an existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, entry: Value) -> Option<Value> {
        self.entries.insert(key.into(), entry)
    }

    /// Iterates over the keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Iterates over the entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the embedded `path` of a file entry, if any.
    pub fn entry_path(entry: &Value) -> Option<&str> {
        entry.get(Self::PATH_FIELD).and_then(Value::as_str)
    }
}

impl IntoIterator for CoverageMap {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, Value)> for CoverageMap {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
