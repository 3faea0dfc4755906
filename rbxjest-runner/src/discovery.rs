// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Finding test files on disk.

use crate::{errors::DiscoveryError, helpers::normalize_separators};
use camino::{Utf8Path, Utf8PathBuf};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::debug;
use walkdir::WalkDir;

/// Finds test files under a project root using include and ignore globs.
///
/// Globs are matched against paths relative to the root, with forward slashes. `*` does not cross
/// directory boundaries; `**` does.
#[derive(Clone, Debug)]
pub struct TestDiscovery {
    root: Utf8PathBuf,
    test_match: GlobSet,
    ignore: GlobSet,
}

impl TestDiscovery {
    /// Creates a new discovery for `root`.
    pub fn new(
        root: impl Into<Utf8PathBuf>,
        test_match: &[String],
        test_path_ignore: &[String],
    ) -> Result<Self, DiscoveryError> {
        Ok(Self {
            root: root.into(),
            test_match: build_glob_set(test_match)?,
            ignore: build_glob_set(test_path_ignore)?,
        })
    }

    /// Returns true if `relative` (a path relative to the root) is a test file.
    pub fn is_test_file(&self, relative: &str) -> bool {
        let relative = normalize_separators(relative);
        self.test_match.is_match(&relative) && !self.ignore.is_match(&relative)
    }

    /// Walks the root and returns the absolute paths of all test files, sorted.
    pub fn discover(&self) -> Result<Vec<Utf8PathBuf>, DiscoveryError> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.file_name() != ".git");

        for entry in walker {
            let entry = entry.map_err(|error| DiscoveryError::Walk {
                root: self.root.clone(),
                error,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = Utf8Path::from_path(entry.path()).ok_or_else(|| {
                DiscoveryError::NonUtf8Path {
                    path: entry.path().to_owned(),
                }
            })?;
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            if self.is_test_file(relative.as_str()) {
                files.push(path.to_owned());
            }
        }

        files.sort_unstable();
        debug!(root = %self.root, count = files.len(), "discovered test files");
        Ok(files)
    }
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet, DiscoveryError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|error| DiscoveryError::InvalidGlob {
                pattern: pattern.clone(),
                error,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(DiscoveryError::GlobSet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    fn default_discovery(root: &Utf8Path) -> TestDiscovery {
        TestDiscovery::new(
            root,
            &strings(&["**/*.spec.ts", "**/*.spec.luau", "**/*.spec.lua"]),
            &strings(&["**/node_modules/**", "**/include/**"]),
        )
        .unwrap()
    }

    #[test]
    fn discovers_sorted_test_files() {
        let dir = Utf8TempDir::new().unwrap();
        let root = dir.path();
        for rel in [
            "src/z.spec.ts",
            "src/nested/b.spec.luau",
            "src/a.spec.ts",
            "src/c.ts",
            "root.spec.lua",
            "node_modules/pkg/d.spec.ts",
            "include/e.spec.lua",
            ".git/x.spec.ts",
        ] {
            let path = root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "").unwrap();
        }

        let files = default_discovery(root).discover().unwrap();
        let relative: Vec<_> = files
            .iter()
            .map(|f| f.strip_prefix(root).unwrap().as_str().to_owned())
            .collect();
        assert_eq!(
            relative,
            [
                "root.spec.lua",
                "src/a.spec.ts",
                "src/nested/b.spec.luau",
                "src/z.spec.ts",
            ]
        );
    }

    #[test]
    fn empty_project() {
        let dir = Utf8TempDir::new().unwrap();
        assert_eq!(default_discovery(dir.path()).discover().unwrap(), Vec::<Utf8PathBuf>::new());
    }

    #[test]
    fn star_does_not_cross_directories() {
        let discovery =
            TestDiscovery::new("/p", &strings(&["src/*.spec.ts"]), &[]).unwrap();
        assert!(discovery.is_test_file("src/a.spec.ts"));
        assert!(!discovery.is_test_file("src/nested/a.spec.ts"));
        assert!(discovery.is_test_file("src\\a.spec.ts"));
    }

    #[test]
    fn invalid_glob() {
        let err = TestDiscovery::new("/p", &strings(&["src/[.ts"]), &[]).unwrap_err();
        assert!(
            matches!(&err, DiscoveryError::InvalidGlob { pattern, .. } if pattern == "src/[.ts"),
            "{err:?}"
        );
    }
}
