// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for splitting a run across several concurrent workers.
//!
//! Test files are split into contiguous shards in discovery order. Each shard is handed to the
//! runtime along with a path pattern that selects exactly that shard's files.

use crate::module_map::ModulePathMap;
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use std::{collections::BTreeMap, fmt};

/// Matches one path separator in a runtime test path.
const SEPARATOR: &str = r"[./\\]";

/// Identifies a shard within a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShardId {
    index: usize,
    total: usize,
}

impl ShardId {
    /// Creates a new shard ID. `index` counts up from 0.
    pub fn new(index: usize, total: usize) -> Self {
        Self { index, total }
    }

    /// The ID of the only shard in an unsharded run.
    pub fn single() -> Self {
        Self::new(0, 1)
    }

    /// Returns the 0-based index of this shard.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the total number of shards in the run.
    pub fn total(&self) -> usize {
        self.total
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total <= 1 {
            write!(f, "run")
        } else {
            write!(f, "shard {}/{}", self.index + 1, self.total)
        }
    }
}

/// A regular expression over runtime test paths selecting one shard's files.
///
/// Runtime paths are matched whole, so a file never selects another file that merely shares a
/// suffix with it. Dots and slashes are interchangeable in the pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardFilter {
    pattern: String,
}

impl ShardFilter {
    /// Builds a filter for `files`.
    ///
    /// Files known to the map are matched by their instance address. Other files fall back to
    /// their parent directory and stem, anchored at a separator.
    pub fn for_files(map: &ModulePathMap, files: &[Utf8PathBuf]) -> Self {
        let mut mapped = Vec::new();
        let mut unmapped = Vec::new();
        for file in files {
            match map.entry_for_file(file.as_str()) {
                Some(entry) => mapped.push(separator_tolerant(&entry.runtime_address)),
                None => unmapped.push(separator_tolerant(&fallback_key(file))),
            }
        }

        let mut alternatives = Vec::new();
        if !mapped.is_empty() {
            alternatives.push(format!(r"^(?:{})(?:\.luau?)?$", mapped.iter().join("|")));
        }
        if !unmapped.is_empty() {
            alternatives.push(format!(
                r"(?:^|{SEPARATOR})(?:{})(?:\.luau?)?$",
                unmapped.iter().join("|")
            ));
        }
        Self {
            pattern: alternatives.join("|"),
        }
    }

    /// Returns the pattern.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Display for ShardFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

fn separator_tolerant(path: &str) -> String {
    path.split(['.', '/', '\\'])
        .map(regex::escape)
        .join(SEPARATOR)
}

/// Returns `parent/stem` for a file, without any extension.
fn fallback_key(file: &Utf8Path) -> String {
    let stem = file.file_stem().unwrap_or(file.as_str());
    match file.parent().and_then(|parent| parent.file_name()) {
        Some(parent) => format!("{parent}/{stem}"),
        None => stem.to_owned(),
    }
}

/// Collapses discovered test files to one file per module.
///
/// A module's original source and its compiled output can both match the discovery globs, but the
/// runtime only knows the module once. When both are present the source file is kept. Files the
/// map doesn't know are kept as they are. The result is sorted.
pub fn unique_module_files(map: &ModulePathMap, files: &[Utf8PathBuf]) -> Vec<Utf8PathBuf> {
    let mut by_module: BTreeMap<&str, &Utf8PathBuf> = BTreeMap::new();
    let mut unmapped = Vec::new();
    for file in files {
        let Some(entry) = map.entry_for_file(file.as_str()) else {
            unmapped.push(file);
            continue;
        };
        let is_source = map.entry_for_source(file.as_str()).is_some();
        by_module
            .entry(entry.runtime_address.as_str())
            .and_modify(|kept| {
                if is_source {
                    *kept = file;
                }
            })
            .or_insert(file);
    }

    by_module
        .into_values()
        .chain(unmapped)
        .cloned()
        .sorted()
        .collect()
}

/// One partition of the discovered test files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shard {
    /// The shard's identity.
    pub id: ShardId,

    /// The files in this shard, in discovery order.
    pub files: Vec<Utf8PathBuf>,

    /// The filter selecting exactly these files.
    pub filter: ShardFilter,
}

/// How a run is executed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunPlan {
    /// Nothing was discovered, so nothing runs.
    Empty,

    /// A single unfiltered execution.
    Single,

    /// Several filtered executions running concurrently.
    Fanout(Vec<Shard>),
}

impl RunPlan {
    /// Plans a run of `files` across up to `workers` workers.
    pub fn new(map: &ModulePathMap, files: &[Utf8PathBuf], workers: usize) -> Self {
        if files.is_empty() {
            return Self::Empty;
        }
        if files.len() <= 1 || workers <= 1 {
            return Self::Single;
        }

        let chunk_size = files.len().div_ceil(workers);
        let chunks: Vec<_> = files.chunks(chunk_size).collect();
        let total = chunks.len();
        let shards = chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| Shard {
                id: ShardId::new(index, total),
                files: chunk.to_vec(),
                filter: ShardFilter::for_files(map, chunk),
            })
            .collect();
        Self::Fanout(shards)
    }

    /// Returns the number of executions this plan makes.
    pub fn execution_count(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Single => 1,
            Self::Fanout(shards) => shards.len(),
        }
    }
}
