// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for rbxjest-runner.

use camino::Utf8Path;
use itertools::Itertools;

/// Utilities for pluralizing various words based on count or plurality.
pub mod plural {
    /// Returns "file" if `count` is 1, otherwise "files".
    pub fn files_str(count: usize) -> &'static str {
        if count == 1 { "file" } else { "files" }
    }

    /// Returns "shard" if `count` is 1, otherwise "shards".
    pub fn shards_str(count: usize) -> &'static str {
        if count == 1 { "shard" } else { "shards" }
    }

    /// Returns "frame" if `count` is 1, otherwise "frames".
    pub fn frames_str(count: usize) -> &'static str {
        if count == 1 { "frame" } else { "frames" }
    }
}

/// Script extensions understood by the runtime, longest first.
pub(crate) const SCRIPT_EXTENSIONS: &[&str] = &[".luau", ".lua"];

/// Replaces backslashes with forward slashes.
pub(crate) fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Removes a trailing `.luau` or `.lua` extension, if any.
pub(crate) fn strip_script_extension(path: &str) -> &str {
    SCRIPT_EXTENSIONS
        .iter()
        .find_map(|ext| path.strip_suffix(ext))
        .unwrap_or(path)
}

/// Returns true if the path has a Luau script extension.
pub(crate) fn has_script_extension(path: &Utf8Path) -> bool {
    matches!(path.extension(), Some("lua" | "luau"))
}

/// Converts a runtime test path or coverage key into the dotted form used for address lookups.
///
/// Both `/` and `\` become `.`, a script extension is dropped, and leading `./` or `/` is ignored.
pub(crate) fn address_key(path: &str) -> String {
    let trimmed = path.trim();
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    let trimmed = trimmed.trim_start_matches(['/', '\\']);
    strip_script_extension(trimmed).replace(['/', '\\'], ".")
}

/// Collapses every run of whitespace into a single space and trims the ends.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().join(" ")
}

/// Displays `path` relative to `root` when it lies under it, with forward slashes.
pub(crate) fn display_relative(path: &str, root: &Utf8Path) -> String {
    let relative = Utf8Path::new(path)
        .strip_prefix(root)
        .map(|p| p.as_str())
        .unwrap_or(path);
    normalize_separators(relative)
}
