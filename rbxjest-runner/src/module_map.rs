// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping between runtime instance addresses and files on disk.
//!
//! The runtime addresses modules by their position in an instance tree
//! (`ReplicatedStorage.Shared.math`). A Rojo sourcemap describes that tree along with the compiled
//! files backing each instance. [`ModulePathMapBuilder`] walks the sourcemap once and produces a
//! [`ModulePathMap`], which answers lookups in both directions for the rest of the run.

use crate::{
    errors::ModuleMapBuildError,
    helpers::{address_key, has_script_extension, normalize_separators, strip_script_extension},
};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Source extensions probed when looking for the original file, in order of preference.
pub const SOURCE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".luau", ".lua"];

/// A node in a Rojo sourcemap.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourcemapNode {
    /// The instance name.
    pub name: String,

    /// The instance class, e.g. `ModuleScript` or `Folder`.
    #[serde(default)]
    pub class_name: Option<String>,

    /// Files backing this instance, relative to the project root.
    #[serde(default)]
    pub file_paths: Vec<Utf8PathBuf>,

    /// Child instances, in declared order.
    #[serde(default)]
    pub children: Vec<SourcemapNode>,
}

impl SourcemapNode {
    const DATA_MODEL: &'static str = "DataModel";

    fn is_data_model(&self) -> bool {
        self.class_name.as_deref() == Some(Self::DATA_MODEL)
    }
}

/// A single module known to the runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleMapEntry {
    /// The dotted instance address, e.g. `ReplicatedStorage.Shared.math`.
    pub runtime_address: String,

    /// The absolute path of the compiled file the runtime executes.
    pub compiled_path: Utf8PathBuf,

    /// The absolute path of the original source file, if one exists.
    pub source_path: Option<Utf8PathBuf>,
}

impl ModuleMapEntry {
    /// Returns the source path if there is one, otherwise the compiled path.
    pub fn best_path(&self) -> &Utf8Path {
        self.source_path.as_deref().unwrap_or(&self.compiled_path)
    }
}

/// The result of resolving a runtime test path against a [`ModulePathMap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestPathMatch<'a> {
    /// The path named an address directly.
    Exact(&'a ModuleMapEntry),

    /// The path was a segment-aligned suffix of exactly one address.
    Suffix(&'a ModuleMapEntry),

    /// The path was a suffix of several addresses.
    Ambiguous(usize),

    /// Nothing matched.
    NoMatch,
}

impl<'a> TestPathMatch<'a> {
    /// Returns the matched entry, if the match was unique.
    pub fn entry(self) -> Option<&'a ModuleMapEntry> {
        match self {
            Self::Exact(entry) | Self::Suffix(entry) => Some(entry),
            Self::Ambiguous(_) | Self::NoMatch => None,
        }
    }
}

/// Lookup table from runtime addresses to files on disk, with reverse indexes.
///
/// Addresses are unique: inserting an address a second time replaces the earlier entry.
#[derive(Clone, Debug)]
pub struct ModulePathMap {
    project_root: Utf8PathBuf,
    by_address: BTreeMap<String, ModuleMapEntry>,
    by_compiled: HashMap<String, String>,
    by_source: HashMap<String, String>,
}

impl ModulePathMap {
    /// Creates an empty map for the given project root.
    pub fn new(project_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            by_address: BTreeMap::new(),
            by_compiled: HashMap::new(),
            by_source: HashMap::new(),
        }
    }

    /// Creates a map from a list of entries. Later entries win over earlier ones.
    pub fn from_entries(
        project_root: impl Into<Utf8PathBuf>,
        entries: impl IntoIterator<Item = ModuleMapEntry>,
    ) -> Self {
        let mut map = Self::new(project_root);
        for entry in entries {
            map.insert(entry);
        }
        map
    }

    /// Returns the project root.
    pub fn project_root(&self) -> &Utf8Path {
        &self.project_root
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    /// Returns true if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }

    /// Iterates over entries in address order.
    pub fn entries(&self) -> impl Iterator<Item = &ModuleMapEntry> + '_ {
        self.by_address.values()
    }

    /// Inserts an entry, replacing any earlier entry for the same address.
    pub fn insert(&mut self, entry: ModuleMapEntry) -> Option<ModuleMapEntry> {
        let previous = self.by_address.remove(&entry.runtime_address);
        if let Some(previous) = &previous {
            self.remove_reverse(previous);
        }

        self.by_compiled.insert(
            normalize_separators(entry.compiled_path.as_str()),
            entry.runtime_address.clone(),
        );
        if let Some(source) = &entry.source_path {
            self.by_source.insert(
                normalize_separators(source.as_str()),
                entry.runtime_address.clone(),
            );
        }
        self.by_address
            .insert(entry.runtime_address.clone(), entry);
        previous
    }

    fn remove_reverse(&mut self, entry: &ModuleMapEntry) {
        let compiled = normalize_separators(entry.compiled_path.as_str());
        if self.by_compiled.get(&compiled) == Some(&entry.runtime_address) {
            self.by_compiled.remove(&compiled);
        }
        if let Some(source) = &entry.source_path {
            let source = normalize_separators(source.as_str());
            if self.by_source.get(&source) == Some(&entry.runtime_address) {
                self.by_source.remove(&source);
            }
        }
    }

    /// Looks up an entry by its dotted address.
    ///
    /// Slashes are accepted in place of dots, and a trailing `.lua`/`.luau` is ignored.
    pub fn get(&self, address: &str) -> Option<&ModuleMapEntry> {
        self.by_address
            .get(address)
            .or_else(|| self.by_address.get(&address_key(address)))
    }

    /// Looks up an entry by the path of its compiled file.
    ///
    /// Relative paths are taken relative to the project root. A path without a script extension
    /// also matches `.luau` and `.lua` files.
    pub fn lookup_compiled(&self, path: &str) -> Option<&ModuleMapEntry> {
        let absolute = self.absolutize(path);
        let found = self.by_compiled.get(&absolute).or_else(|| {
            if has_script_extension(Utf8Path::new(&absolute)) {
                return None;
            }
            ["luau", "lua"]
                .iter()
                .find_map(|ext| self.by_compiled.get(&format!("{absolute}.{ext}")))
        })?;
        self.by_address.get(found)
    }

    /// Looks up an entry by the path of its original source file.
    pub fn entry_for_source(&self, path: &str) -> Option<&ModuleMapEntry> {
        let address = self.by_source.get(&self.absolutize(path))?;
        self.by_address.get(address)
    }

    /// Returns true if `path` is the original source file of some entry.
    pub fn is_known_source(&self, path: &str) -> bool {
        self.by_source.contains_key(&self.absolutize(path))
    }

    /// Returns the entry for a discovered test file, which may be either a source or a compiled
    /// file.
    pub fn entry_for_file(&self, path: &str) -> Option<&ModuleMapEntry> {
        self.entry_for_source(path)
            .or_else(|| self.lookup_compiled(path))
    }

    /// Resolves a test path reported by the runtime.
    ///
    /// Tries an exact address match first, then a suffix match aligned on address segments. A
    /// suffix shared by several addresses is reported as ambiguous rather than guessed.
    pub fn resolve_test_path(&self, raw: &str) -> TestPathMatch<'_> {
        let key = address_key(raw);
        if key.is_empty() {
            return TestPathMatch::NoMatch;
        }
        if let Some(entry) = self.by_address.get(&key) {
            return TestPathMatch::Exact(entry);
        }

        let mut matches = self
            .by_address
            .iter()
            .filter(|(address, _)| is_segment_suffix(address, &key))
            .map(|(_, entry)| entry);
        match (matches.next(), matches.count()) {
            (None, _) => TestPathMatch::NoMatch,
            (Some(entry), 0) => TestPathMatch::Suffix(entry),
            (Some(_), rest) => TestPathMatch::Ambiguous(rest + 1),
        }
    }

    fn absolutize(&self, path: &str) -> String {
        let normalized = normalize_separators(path);
        if Utf8Path::new(&normalized).is_absolute() || looks_like_drive_path(&normalized) {
            normalized
        } else {
            let relative = normalized.strip_prefix("./").unwrap_or(&normalized);
            normalize_separators(self.project_root.join(relative).as_str())
        }
    }
}

fn is_segment_suffix(address: &str, suffix: &str) -> bool {
    address
        .strip_suffix(suffix)
        .is_some_and(|head| head.is_empty() || head.ends_with('.'))
}

fn looks_like_drive_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}

/// Builds a [`ModulePathMap`] from a Rojo sourcemap.
#[derive(Clone, Debug)]
pub struct ModulePathMapBuilder {
    project_root: Utf8PathBuf,
    source_root: Utf8PathBuf,
    output_root: Utf8PathBuf,
}

impl ModulePathMapBuilder {
    /// Creates a new builder for a project rooted at `project_root`.
    ///
    /// The source root defaults to `src` and the output root to `out`.
    pub fn new(project_root: impl Into<Utf8PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            source_root: project_root.join("src"),
            output_root: project_root.join("out"),
            project_root,
        }
    }

    /// Sets the directory containing original sources. Relative paths are taken relative to the
    /// project root.
    pub fn set_source_root(&mut self, dir: impl AsRef<Utf8Path>) -> &mut Self {
        self.source_root = self.project_root.join(dir);
        self
    }

    /// Sets the directory containing compiled output. Relative paths are taken relative to the
    /// project root.
    pub fn set_output_root(&mut self, dir: impl AsRef<Utf8Path>) -> &mut Self {
        self.output_root = self.project_root.join(dir);
        self
    }

    /// Reads and parses the sourcemap at `path`, then builds the map.
    pub fn build_from_file(&self, path: &Utf8Path) -> Result<ModulePathMap, ModuleMapBuildError> {
        let path = self.project_root.join(path);
        let contents =
            std::fs::read_to_string(&path).map_err(|error| ModuleMapBuildError::Read {
                path: path.clone(),
                error,
            })?;
        let root: SourcemapNode = serde_json::from_str(&contents)
            .map_err(|error| ModuleMapBuildError::Parse { path, error })?;
        Ok(self.build(&root))
    }

    /// Builds the map from an already-parsed sourcemap tree.
    pub fn build(&self, root: &SourcemapNode) -> ModulePathMap {
        let mut map = ModulePathMap::new(self.project_root.clone());
        let prefix = if root.is_data_model() {
            String::new()
        } else {
            root.name.clone()
        };
        if !prefix.is_empty() {
            self.record(root, &prefix, &mut map);
        }
        for child in &root.children {
            self.visit(child, &prefix, &mut map);
        }

        debug!(
            entries = map.len(),
            sources = map.by_source.len(),
            "built module path map"
        );
        map
    }

    fn visit(&self, node: &SourcemapNode, parent: &str, map: &mut ModulePathMap) {
        let address = if parent.is_empty() {
            node.name.clone()
        } else {
            format!("{parent}.{}", node.name)
        };
        self.record(node, &address, map);
        for child in &node.children {
            self.visit(child, &address, map);
        }
    }

    fn record(&self, node: &SourcemapNode, address: &str, map: &mut ModulePathMap) {
        let Some(file) = node
            .file_paths
            .iter()
            .find(|path| has_script_extension(path))
        else {
            return;
        };
        let compiled_path = self
            .project_root
            .join(normalize_separators(file.as_str()));
        let source_path = self.resolve_source(&compiled_path);
        if source_path.is_none() {
            debug!(%address, %compiled_path, "no source file for module");
        }

        map.insert(ModuleMapEntry {
            runtime_address: address.to_owned(),
            compiled_path,
            source_path,
        });
    }

    fn resolve_source(&self, compiled: &Utf8Path) -> Option<Utf8PathBuf> {
        let Ok(relative) = compiled.strip_prefix(&self.output_root) else {
            // A script outside the build output is its own source when it lives in the source
            // tree.
            return compiled
                .starts_with(&self.source_root)
                .then(|| compiled.to_owned());
        };

        let rerooted = self.source_root.join(relative);
        let dir = rerooted.parent()?;
        let stem = strip_script_extension(rerooted.file_name()?);
        let stems = match index_stem(stem) {
            Some(index) => vec![index, stem],
            None => vec![stem],
        };

        stems.into_iter().find_map(|stem| {
            SOURCE_EXTENSIONS
                .iter()
                .map(|ext| dir.join(format!("{stem}{ext}")))
                .find(|candidate| candidate.is_file())
        })
    }
}

/// Maps a directory-index artifact stem onto the index-file convention.
fn index_stem(stem: &str) -> Option<&'static str> {
    match stem {
        "init" => Some("index"),
        "init.server" => Some("index.server"),
        "init.client" => Some("index.client"),
        _ => None,
    }
}
