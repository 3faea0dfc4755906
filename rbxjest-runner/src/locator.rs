// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heuristics for mapping compiled line numbers back onto source lines.

use crate::helpers::collapse_whitespace;
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
};
use tracing::debug;

/// Source lines shorter than this are never used as a containment match.
const MIN_FRAGMENT_LEN: usize = 6;

/// Cache of file contents split into lines.
///
/// Unreadable files are cached as empty.
#[derive(Debug, Default)]
pub struct FileLineCache {
    files: HashMap<Utf8PathBuf, Arc<[String]>>,
}

impl FileLineCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lines of `path`, reading the file on first access.
    pub fn lines(&mut self, path: &Utf8Path) -> Arc<[String]> {
        if let Some(lines) = self.files.get(path) {
            return lines.clone();
        }

        let lines: Arc<[String]> = match std::fs::read_to_string(path) {
            Ok(contents) => contents.lines().map(str::to_owned).collect(),
            Err(error) => {
                debug!(%path, %error, "unable to read file, treating as empty");
                Vec::new().into()
            }
        };
        self.files.insert(path.to_owned(), lines.clone());
        lines
    }

    /// Returns a single 1-based line of `path`.
    pub fn line(&mut self, path: &Utf8Path, line: usize) -> Option<String> {
        let index = line.checked_sub(1)?;
        self.lines(path).get(index).cloned()
    }

    /// Returns the number of files cached so far.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if nothing has been cached.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Finds source lines corresponding to compiled lines.
#[derive(Debug, Default)]
pub struct SourceLocator {
    cache: FileLineCache,
}

impl SourceLocator {
    /// Creates a locator with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the underlying line cache.
    pub fn cache_mut(&mut self) -> &mut FileLineCache {
        &mut self.cache
    }

    /// Maps a 1-based line in `compiled` to the corresponding 1-based line in `source`.
    ///
    /// Looks for a source line whose trimmed text equals the compiled line's, then for a line
    /// where one contains the other after collapsing whitespace. Among several candidates the one
    /// nearest to `compiled_line` wins, the earlier one on ties. If nothing matches,
    /// `compiled_line` is returned unchanged.
    pub fn find_source_line(
        &mut self,
        compiled: &Utf8Path,
        source: &Utf8Path,
        compiled_line: usize,
    ) -> usize {
        let compiled_lines = self.cache.lines(compiled);
        let Some(target) = compiled_line
            .checked_sub(1)
            .and_then(|index| compiled_lines.get(index))
            .map(|text| text.trim())
            .filter(|text| !text.is_empty())
        else {
            return compiled_line;
        };
        let source_lines = self.cache.lines(source);

        let exact = source_lines
            .iter()
            .enumerate()
            .filter(|(_, text)| text.trim() == target)
            .map(|(index, _)| index + 1);
        if let Some(line) = nearest(exact, compiled_line) {
            return line;
        }

        let target = collapse_whitespace(target);
        let collapsed: Vec<_> = source_lines
            .iter()
            .map(|text| collapse_whitespace(text))
            .collect();

        if target.len() >= MIN_FRAGMENT_LEN {
            let containing = collapsed
                .iter()
                .enumerate()
                .filter(|(_, text)| text.contains(target.as_str()))
                .map(|(index, _)| index + 1);
            if let Some(line) = nearest(containing, compiled_line) {
                return line;
            }
        }

        let contained = collapsed
            .iter()
            .enumerate()
            .filter(|(_, text)| text.len() >= MIN_FRAGMENT_LEN && target.contains(text.as_str()))
            .map(|(index, _)| index + 1);
        nearest(contained, compiled_line).unwrap_or(compiled_line)
    }
}

fn nearest(candidates: impl Iterator<Item = usize>, line: usize) -> Option<usize> {
    candidates.min_by_key(|candidate| candidate.abs_diff(line))
}

static EXPECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bexpect\s*\(").expect("expect regex is valid"));

/// Returns the 1-based column of the matcher in an assertion on `line`.
///
/// For `expect(actual).never.toBe(expected)` this is the column of `toBe`: the last method call
/// chained onto the `expect(...)` call, with either `.` or `:` syntax. Falls back to the column of
/// `expect`, then to 1.
pub fn find_expectation_column(line: &str) -> usize {
    let Some(expect) = EXPECT_RE.find(line) else {
        return 1;
    };
    let column_of = |byte: usize| line[..byte].chars().count() + 1;

    let bytes = line.as_bytes();
    let Some(mut pos) = skip_balanced(bytes, expect.end() - 1) else {
        return column_of(expect.start());
    };

    let mut matcher = None;
    loop {
        pos = skip_whitespace(bytes, pos);
        if !matches!(bytes.get(pos), Some(b'.' | b':')) {
            break;
        }
        let name_start = skip_whitespace(bytes, pos + 1);
        let name_end = identifier_end(bytes, name_start);
        if name_end == name_start {
            break;
        }
        let after = skip_whitespace(bytes, name_end);
        if bytes.get(after) == Some(&b'(') {
            matcher = Some(name_start);
            match skip_balanced(bytes, after) {
                Some(next) => pos = next,
                None => break,
            }
        } else {
            pos = name_end;
        }
    }

    column_of(matcher.unwrap_or(expect.start()))
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while bytes.get(pos).is_some_and(|b| b.is_ascii_whitespace()) {
        pos += 1;
    }
    pos
}

fn identifier_end(bytes: &[u8], start: usize) -> usize {
    let mut pos = start;
    while let Some(&b) = bytes.get(pos) {
        let valid = b == b'_' || b.is_ascii_alphabetic() || (pos > start && b.is_ascii_digit());
        if !valid {
            break;
        }
        pos += 1;
    }
    pos
}

/// Given the index of an opening parenthesis, returns the index just past its matching close.
///
/// Quoted strings are skipped over.
fn skip_balanced(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut pos = open;
    while pos < bytes.len() {
        match bytes[pos] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos + 1);
                }
            }
            quote @ (b'"' | b'\'' | b'`') => {
                pos += 1;
                while pos < bytes.len() && bytes[pos] != quote {
                    if bytes[pos] == b'\\' {
                        pos += 1;
                    }
                    pos += 1;
                }
            }
            _ => {}
        }
        pos += 1;
    }
    None
}
