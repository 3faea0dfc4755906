// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rewriting suite and test case results so that they refer to source files.

use crate::{
    code_frame::{CodeFrameBuilder, DEFAULT_CONTEXT_LINES, inject_code_frame},
    helpers::normalize_separators,
    module_map::{ModulePathMap, TestPathMatch},
    stack::{InternalFramePatterns, ResolvedFrame, StackRewriter},
};
use camino::{Utf8Path, Utf8PathBuf};
use rbxjest_metadata::{AggregatedResult, AssertionResult, CallSite, TestFileResult};
use regex::Regex;
use tracing::debug;

/// The marker that starts each failure in a combined failure message.
const FAILURE_SEPARATOR: char = '●';

/// Options controlling how results are rewritten.
#[derive(Clone, Debug)]
pub struct RewriteOptions {
    /// Lines of context shown on either side of a code frame's target line.
    pub code_frame_context: usize,

    /// Whether to locate each test's declaration in its source file.
    pub test_location_in_results: bool,

    /// Whether to remove internal frame lines from stack traces.
    pub strip_internal_frames: bool,

    /// Patterns marking a frame as internal.
    pub internal_frame_patterns: InternalFramePatterns,

    /// Whether code frames are syntax highlighted.
    pub colorize: bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            code_frame_context: DEFAULT_CONTEXT_LINES,
            test_location_in_results: false,
            strip_internal_frames: true,
            internal_frame_patterns: InternalFramePatterns::default(),
            colorize: false,
        }
    }
}

/// Rewrites results in place.
///
/// One rewriter is used per run: it owns the cache of file contents read while rewriting.
#[derive(Debug)]
pub struct ResultRewriter<'map> {
    stack: StackRewriter<'map>,
    code_frames: CodeFrameBuilder,
    test_location_in_results: bool,
}

impl<'map> ResultRewriter<'map> {
    /// Creates a new rewriter.
    pub fn new(map: &'map ModulePathMap, options: &RewriteOptions) -> Self {
        let mut stack = StackRewriter::new(map);
        stack
            .set_internal_patterns(options.internal_frame_patterns.clone())
            .set_strip_internal(options.strip_internal_frames);
        let mut code_frames = CodeFrameBuilder::new(options.code_frame_context);
        if options.colorize {
            code_frames.colorize();
        }

        Self {
            stack,
            code_frames,
            test_location_in_results: options.test_location_in_results,
        }
    }

    /// Rewrites every suite in `results`.
    pub fn rewrite_results(&mut self, results: &mut AggregatedResult) {
        for suite in &mut results.test_results {
            self.rewrite_suite(suite);
        }
        debug!(
            suites = results.test_results.len(),
            "rewrote results to source locations"
        );
    }

    /// Rewrites a single suite: its path, its failure message, and each of its test cases.
    pub fn rewrite_suite(&mut self, suite: &mut TestFileResult) {
        let test_path = self.resolve_test_file_path(&suite.test_file_path);

        if let Some(message) = suite.failure_message.take() {
            suite.failure_message = Some(self.rewrite_message(&message, &test_path));
        }
        for case in &mut suite.test_results {
            case.failure_messages = case
                .failure_messages
                .iter()
                .map(|message| self.rewrite_message(message, &test_path))
                .collect();
            if self.test_location_in_results {
                if let Some(location) = self.find_declaration(&test_path, case) {
                    case.location = Some(location);
                }
            }
        }

        suite.test_file_path = test_path.into_string();
    }

    /// Resolves a test path reported by the runtime to a file on disk.
    ///
    /// A unique address match resolves to that module's source file, or its compiled file if it
    /// has none. Anything else is joined under the project root.
    pub fn resolve_test_file_path(&self, raw: &str) -> Utf8PathBuf {
        let map = self.stack.map();
        let normalized = normalize_separators(raw);
        if Utf8Path::new(&normalized).is_absolute() {
            if map.is_known_source(&normalized) {
                return normalized.into();
            }
            if let Some(entry) = map.lookup_compiled(&normalized) {
                return entry.best_path().to_owned();
            }
        }

        match map.resolve_test_path(raw) {
            TestPathMatch::Exact(entry) | TestPathMatch::Suffix(entry) => {
                entry.best_path().to_owned()
            }
            TestPathMatch::Ambiguous(count) => {
                debug!(path = raw, count, "test path matches several modules, not guessing");
                map.project_root().join(normalized)
            }
            TestPathMatch::NoMatch => {
                debug!(path = raw, "test path does not match any module");
                map.project_root().join(normalized)
            }
        }
    }

    /// Rewrites a failure message, injecting a code frame into each failure it contains.
    pub fn rewrite_message(&mut self, message: &str, test_file: &Utf8Path) -> String {
        split_failures(message)
            .into_iter()
            .map(|section| self.rewrite_section(section, test_file))
            .collect()
    }

    fn rewrite_section(&mut self, section: &str, test_file: &Utf8Path) -> String {
        let rewrite = self.stack.rewrite(section);
        let Some((frame, code_frame)) = self.code_frame_for(&rewrite.frames, test_file) else {
            return rewrite.text;
        };
        inject_code_frame(&rewrite.text, &frame, &code_frame)
    }

    /// Picks the frame in the test file if there is one, otherwise the first readable frame, and
    /// renders a code frame for it.
    fn code_frame_for(
        &mut self,
        frames: &[ResolvedFrame],
        test_file: &Utf8Path,
    ) -> Option<(ResolvedFrame, String)> {
        let in_test_file = frames.iter().find(|frame| frame.absolute_path == test_file);
        let candidates = in_test_file.into_iter().chain(frames);
        for frame in candidates {
            let lines = self
                .stack
                .locator_mut()
                .cache_mut()
                .lines(&frame.absolute_path);
            if let Some(code_frame) = self.code_frames.build(&lines, frame.line, frame.column) {
                return Some((frame.clone(), code_frame));
            }
        }
        None
    }

    /// Finds where a test case is declared, by searching for the enclosing `describe` blocks and
    /// then the test itself.
    fn find_declaration(&mut self, file: &Utf8Path, case: &AssertionResult) -> Option<CallSite> {
        let lines = self.stack.locator_mut().cache_mut().lines(file);
        let mut from = 0;
        for ancestor in &case.ancestor_titles {
            if let Some((index, _)) = find_call(&lines, ancestor, from) {
                from = index;
            }
        }

        let (index, column) =
            find_call(&lines, &case.title, from).or_else(|| find_call(&lines, &case.title, 0))?;
        Some(CallSite {
            line: index + 1,
            column,
        })
    }
}

/// Finds a test or suite declaration with the given title at or after line index `from`.
///
/// Returns the 0-based line index and the 1-based column of the declaring call.
fn find_call(lines: &[String], title: &str, from: usize) -> Option<(usize, usize)> {
    let title = regex::escape(title);
    let pattern = format!(
        r#"\b(?:it|test|describe|itFOCUS|itSKIP|itFIXME|fit|xit|xtest|fdescribe|xdescribe|describeFOCUS|describeSKIP)(?:\s*[.:]\s*(?:only|skip|todo|each|failing|concurrent))*\s*(?:\([^)]*\)\s*)?\(\s*(?:"{title}"|'{title}'|`{title}`|\[\[{title}\]\])"#
    );
    let regex = match Regex::new(&pattern) {
        Ok(regex) => regex,
        Err(error) => {
            debug!(%error, "unable to build declaration pattern");
            return None;
        }
    };

    lines
        .iter()
        .enumerate()
        .skip(from)
        .find_map(|(index, line)| {
            let found = regex.find(line)?;
            Some((index, line[..found.start()].chars().count() + 1))
        })
}

/// Splits a combined failure message into one section per failure.
///
/// A section starts at each line beginning with `●`, ignoring indentation and ANSI escapes.
/// Concatenating the sections gives back the original message.
fn split_failures(message: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    for line in message.split_inclusive('\n') {
        let is_separator = strip_ansi_escapes::strip_str(line)
            .trim_start()
            .starts_with(FAILURE_SEPARATOR);
        if is_separator && offset > start {
            sections.push(&message[start..offset]);
            start = offset;
        }
        offset += line.len();
    }
    if offset > start || sections.is_empty() {
        sections.push(&message[start..]);
    }
    sections
}
