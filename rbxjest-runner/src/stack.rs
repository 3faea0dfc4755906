// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tokenizing and rewriting stack traces.
//!
//! Stack traces and failure messages produced by the runtime refer to modules by instance
//! address (`ReplicatedStorage.Shared.math:12`) or by chunk name
//! (`[string "ReplicatedStorage.Shared.math"]:12:`). The tokenizer recognizes the grammar:
//!
//! ```text
//! frame      := quoted | bare
//! quoted     := '[string "' path-token '"]' ':' line [ ':' column ]
//! bare       := path-token ':' line [ ':' column ]
//! path-token := [drive ':'] path-char+
//! path-char  := ASCII alphanumeric | '_' | '-' | '.' | '/' | '\' | '@' | '$'
//! ```
//!
//! [`StackRewriter`] resolves each token through the [`ModulePathMap`] and replaces it with an
//! absolute `path:line:column`.

use crate::{
    helpers::{normalize_separators, plural},
    locator::{SourceLocator, find_expectation_column},
    module_map::ModulePathMap,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{collections::HashMap, fmt, ops::Range};
use swrite::{SWrite, swrite};
use tracing::debug;

const QUOTED_PREFIX: &str = "[string \"";
const QUOTED_SUFFIX: &str = "\"]";
const ESC: u8 = 0x1b;

/// A `path:line[:column]` occurrence in some text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameToken<'a> {
    /// The byte range of the whole token, including any `[string "..."]` wrapper.
    pub span: Range<usize>,

    /// The path or address.
    pub path: &'a str,

    /// The 1-based line.
    pub line: usize,

    /// The 1-based column, if present.
    pub column: Option<usize>,

    /// True if the token used the `[string "..."]` chunk-name form.
    pub quoted: bool,
}

/// Finds every frame token in `text`, in order.
///
/// ANSI escape sequences are skipped. A bare path must contain a `.`, `/` or `\` and at least one
/// letter, so that times and port numbers are not mistaken for frames.
pub fn tokenize_frames(text: &str) -> Vec<FrameToken<'_>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut at_boundary = true;

    while pos < bytes.len() {
        if bytes[pos] == ESC {
            pos = skip_ansi(bytes, pos);
            at_boundary = true;
            continue;
        }

        if bytes[pos..].starts_with(QUOTED_PREFIX.as_bytes()) {
            if let Some(token) = parse_quoted(text, pos) {
                pos = token.span.end;
                tokens.push(token);
                at_boundary = false;
                continue;
            }
        }

        if at_boundary && is_path_char(bytes[pos]) {
            let path_end = scan_path(bytes, pos);
            if let Some(token) = parse_bare(text, pos, path_end) {
                pos = token.span.end;
                tokens.push(token);
            } else {
                pos = path_end;
            }
            at_boundary = false;
            continue;
        }

        // A path directly after ':' is part of a URL or a `file:line` suffix, not a new frame.
        at_boundary = !is_path_char(bytes[pos]) && bytes[pos] != b':';
        pos += 1;
    }

    tokens
}

fn is_path_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'/' | b'\\' | b'@' | b'$')
}

fn skip_ansi(bytes: &[u8], start: usize) -> usize {
    let mut pos = start + 1;
    if bytes.get(pos) == Some(&b'[') {
        pos += 1;
        while let Some(&b) = bytes.get(pos) {
            pos += 1;
            if (0x40..=0x7e).contains(&b) {
                break;
            }
        }
    } else if pos < bytes.len() {
        pos += 1;
    }
    pos
}

fn scan_path(bytes: &[u8], start: usize) -> usize {
    let mut pos = start;
    let has_drive = bytes.len() > start + 2
        && bytes[start].is_ascii_alphabetic()
        && bytes[start + 1] == b':'
        && matches!(bytes[start + 2], b'/' | b'\\');
    if has_drive {
        pos += 2;
    }
    while bytes.get(pos).copied().is_some_and(is_path_char) {
        pos += 1;
    }
    pos
}

fn scan_digits(bytes: &[u8], start: usize) -> Option<(usize, usize)> {
    let end = start
        + bytes[start.min(bytes.len())..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
    if end == start {
        return None;
    }
    let value = std::str::from_utf8(&bytes[start..end]).ok()?.parse().ok()?;
    Some((value, end))
}

/// Parses `:line[:column]` starting at `pos`, returning the line, column and end of the token.
fn parse_location(bytes: &[u8], pos: usize) -> Option<(usize, Option<usize>, usize)> {
    if bytes.get(pos) != Some(&b':') {
        return None;
    }
    let (line, end) = scan_digits(bytes, pos + 1)?;
    if bytes.get(end) == Some(&b':') {
        if let Some((column, column_end)) = scan_digits(bytes, end + 1) {
            return Some((line, Some(column), column_end));
        }
    }
    Some((line, None, end))
}

fn is_plausible_path(path: &str) -> bool {
    path.contains(['.', '/', '\\']) && path.bytes().any(|b| b.is_ascii_alphabetic())
}

fn parse_bare(text: &str, start: usize, path_end: usize) -> Option<FrameToken<'_>> {
    let path = &text[start..path_end];
    if !is_plausible_path(path) {
        return None;
    }
    let (line, column, end) = parse_location(text.as_bytes(), path_end)?;
    Some(FrameToken {
        span: start..end,
        path,
        line,
        column,
        quoted: false,
    })
}

fn parse_quoted(text: &str, start: usize) -> Option<FrameToken<'_>> {
    let path_start = start + QUOTED_PREFIX.len();
    let path_len = text[path_start..].find(['"', '\n'])?;
    let path_end = path_start + path_len;
    let path = &text[path_start..path_end];
    if path.is_empty() || !text[path_end..].starts_with(QUOTED_SUFFIX) {
        return None;
    }
    let (line, column, end) =
        parse_location(text.as_bytes(), path_end + QUOTED_SUFFIX.len())?;
    Some(FrameToken {
        span: start..end,
        path,
        line,
        column,
        quoted: true,
    })
}

/// Returns the byte offset at which a stack frame would begin on `line`.
///
/// Leading whitespace and ANSI escapes are skipped, as is an `at ` prefix.
fn frame_start(line: &str) -> usize {
    let bytes = line.as_bytes();
    let mut pos = 0;
    loop {
        match bytes.get(pos) {
            Some(&ESC) => pos = skip_ansi(bytes, pos),
            Some(b) if b.is_ascii_whitespace() => pos += 1,
            _ => break,
        }
    }
    if bytes[pos.min(bytes.len())..].starts_with(b"at ") {
        pos += 3;
        while bytes.get(pos).is_some_and(|b| *b == b' ') {
            pos += 1;
        }
    }
    pos
}

/// Returns true if `line` is a stack frame line: one that begins with a frame token, optionally
/// after `at `.
pub fn is_stack_frame_line(line: &str) -> bool {
    let start = frame_start(line);
    tokenize_frames(line)
        .first()
        .is_some_and(|token| token.span.start == start)
}

/// Substrings marking a stack frame as belonging to dependencies or test framework internals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InternalFramePatterns {
    patterns: Vec<String>,
}

impl InternalFramePatterns {
    /// The built-in patterns.
    pub const DEFAULT: &'static [&'static str] = &[
        "node_modules",
        "rbxts_include",
        "_Index",
        "Packages.",
        "DevPackages.",
        "JestCircus",
        "JestCore",
        "JestRuntime",
        "LuauPolyfill",
    ];

    /// Creates a pattern set from exactly the given patterns.
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Appends patterns to this set.
    pub fn with_patterns(mut self, extra: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.patterns.extend(extra.into_iter().map(Into::into));
        self
    }

    /// Returns the patterns.
    pub fn patterns(&self) -> impl Iterator<Item = &str> + '_ {
        self.patterns.iter().map(|p| p.as_str())
    }

    /// Returns true if `path` matches any pattern.
    pub fn is_internal(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| path.contains(p.as_str()))
    }
}

impl Default for InternalFramePatterns {
    fn default() -> Self {
        Self::new(Self::DEFAULT.iter().copied())
    }
}

/// A frame resolved to a file on disk.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResolvedFrame {
    /// The absolute path of the file.
    pub absolute_path: Utf8PathBuf,

    /// The 1-based line.
    pub line: usize,

    /// The 1-based column.
    pub column: usize,
}

impl fmt::Display for ResolvedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.absolute_path, self.line, self.column)
    }
}

/// The result of rewriting a piece of text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackRewrite {
    /// The rewritten text.
    pub text: String,

    /// Resolved frames that remain in the text, in order of appearance.
    pub frames: Vec<ResolvedFrame>,

    /// The number of internal frame lines removed.
    pub stripped: usize,
}

/// Rewrites frame tokens in stack traces and messages to point at files on disk.
#[derive(Debug)]
pub struct StackRewriter<'map> {
    map: &'map ModulePathMap,
    locator: SourceLocator,
    internal: InternalFramePatterns,
    strip_internal: bool,
}

impl<'map> StackRewriter<'map> {
    /// Creates a new rewriter backed by `map`, with the default internal frame patterns.
    pub fn new(map: &'map ModulePathMap) -> Self {
        Self {
            map,
            locator: SourceLocator::new(),
            internal: InternalFramePatterns::default(),
            strip_internal: true,
        }
    }

    /// Sets the internal frame patterns.
    pub fn set_internal_patterns(&mut self, internal: InternalFramePatterns) -> &mut Self {
        self.internal = internal;
        self
    }

    /// Sets whether frame lines matching an internal pattern are removed.
    pub fn set_strip_internal(&mut self, strip_internal: bool) -> &mut Self {
        self.strip_internal = strip_internal;
        self
    }

    /// Returns the map this rewriter resolves through.
    pub fn map(&self) -> &'map ModulePathMap {
        self.map
    }

    /// Returns the source locator, which owns the file line cache.
    pub fn locator_mut(&mut self) -> &mut SourceLocator {
        &mut self.locator
    }

    /// Rewrites `text`, returning only the new text.
    pub fn rewrite_stack_string(&mut self, text: &str) -> String {
        self.rewrite(text).text
    }

    /// Rewrites `text`, replacing every resolvable frame token with `path:line:column` and
    /// removing internal frame lines.
    ///
    /// Text without frame tokens is returned unchanged, and rewriting the output again is a no-op.
    pub fn rewrite(&mut self, text: &str) -> StackRewrite {
        let tokens = tokenize_frames(text);
        if tokens.is_empty() {
            return StackRewrite {
                text: text.to_owned(),
                frames: Vec::new(),
                stripped: 0,
            };
        }

        let mut resolutions: HashMap<(&str, usize, Option<usize>), Option<ResolvedFrame>> =
            HashMap::new();
        let resolved: Vec<_> = tokens
            .iter()
            .map(|token| {
                resolutions
                    .entry((token.path, token.line, token.column))
                    .or_insert_with(|| self.resolve(token))
                    .clone()
            })
            .collect();

        let mut out = String::with_capacity(text.len());
        let mut frames = Vec::new();
        let mut stripped = 0;
        let mut next = 0;
        let mut line_start = 0;

        for line in text.split_inclusive('\n') {
            let line_end = line_start + line.len();
            let first = next;
            while next < tokens.len() && tokens[next].span.start < line_end {
                next += 1;
            }

            let is_internal_frame = first < next
                && tokens[first].span.start == line_start + frame_start(line)
                && (self.internal.is_internal(tokens[first].path)
                    || resolved[first]
                        .as_ref()
                        .is_some_and(|frame| self.internal.is_internal(frame.absolute_path.as_str())));
            if self.strip_internal && is_internal_frame {
                stripped += 1;
                line_start = line_end;
                continue;
            }

            let mut cursor = line_start;
            for (token, frame) in tokens[first..next].iter().zip(&resolved[first..next]) {
                if let Some(frame) = frame {
                    out.push_str(&text[cursor..token.span.start]);
                    swrite!(out, "{frame}");
                    cursor = token.span.end;
                    frames.push(frame.clone());
                }
            }
            out.push_str(&text[cursor..line_end]);
            line_start = line_end;
        }

        if stripped > 0 {
            debug!(stripped, "removed internal stack {}", plural::frames_str(stripped));
        }

        StackRewrite {
            text: out,
            frames,
            stripped,
        }
    }

    fn resolve(&mut self, token: &FrameToken<'_>) -> Option<ResolvedFrame> {
        let map = self.map;
        let raw_column = token.column;

        if Utf8Path::new(token.path).is_absolute() && map.is_known_source(token.path) {
            return Some(ResolvedFrame {
                absolute_path: Utf8PathBuf::from(normalize_separators(token.path)),
                line: token.line,
                column: raw_column.unwrap_or(1),
            });
        }

        if let Some(entry) = map.get(token.path).or_else(|| map.lookup_compiled(token.path)) {
            let cache_line = |locator: &mut SourceLocator, path: &Utf8Path, line: usize| {
                locator.cache_mut().line(path, line).unwrap_or_default()
            };
            return Some(match &entry.source_path {
                Some(source) => {
                    let line =
                        self.locator
                            .find_source_line(&entry.compiled_path, source, token.line);
                    let text = cache_line(&mut self.locator, source, line);
                    ResolvedFrame {
                        absolute_path: source.clone(),
                        line,
                        column: find_expectation_column(&text),
                    }
                }
                None => {
                    let column = raw_column.unwrap_or_else(|| {
                        let text = cache_line(&mut self.locator, &entry.compiled_path, token.line);
                        find_expectation_column(&text)
                    });
                    ResolvedFrame {
                        absolute_path: entry.compiled_path.clone(),
                        line: token.line,
                        column,
                    }
                }
            });
        }

        let joined = map.project_root().join(normalize_separators(token.path));
        if joined.is_file() {
            return Some(ResolvedFrame {
                absolute_path: joined,
                line: token.line,
                column: raw_column.unwrap_or(1),
            });
        }

        debug!(path = token.path, "unable to resolve stack frame");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module_map::ModuleMapEntry;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn tokenizes_bare_and_quoted_frames() {
        let text = "Error at A.B.test:2\n[string \"A.B.test\"]:5:9: oops\n  at C:\\proj\\src\\a.ts:3:7";
        let tokens = tokenize_frames(text);
        let summary: Vec<_> = tokens
            .iter()
            .map(|t| (t.path, t.line, t.column, t.quoted))
            .collect();
        assert_eq!(
            summary,
            [
                ("A.B.test", 2, None, false),
                ("A.B.test", 5, Some(9), true),
                ("C:\\proj\\src\\a.ts", 3, Some(7), false),
            ]
        );
        assert_eq!(&text[tokens[1].span.clone()], "[string \"A.B.test\"]:5:9");
    }

    #[test]
    fn ignores_non_frames() {
        for text in [
            "took 12:30 minutes",
            "listening on localhost:8080",
            "see http://example.com:80/x",
            "expected 1.5:2",
            "plain text with no locations",
        ] {
            assert_eq!(tokenize_frames(text), [], "for {text:?}");
        }
    }

    #[test]
    fn tokenizes_through_ansi_and_mid_word() {
        let text = "\u{1b}[2mReplicatedStorage.Tests.a.spec:4\u{1b}[0m xA.b:3";
        let tokens = tokenize_frames(text);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].path, "ReplicatedStorage.Tests.a.spec");
        assert_eq!(tokens[1].path, "xA.b", "tokens start at word boundaries");
    }

    #[test]
    fn frame_lines() {
        assert!(is_stack_frame_line("    at ReplicatedStorage.Tests.a.spec:4"));
        assert!(is_stack_frame_line("ReplicatedStorage.Tests.a.spec:4 function foo"));
        assert!(!is_stack_frame_line("Error at ReplicatedStorage.Tests.a.spec:4"));
        assert!(!is_stack_frame_line("Expected: 1"));
    }

    struct Fixture {
        dir: Utf8TempDir,
        map: ModulePathMap,
    }

    impl Fixture {
        fn root(&self) -> &Utf8Path {
            self.dir.path()
        }
    }

    fn fixture() -> Fixture {
        let dir = Utf8TempDir::new().unwrap();
        let root = dir.path();
        for (rel, contents) in [
            (
                "out/test.luau",
                "local x = 1\nexpect(x).toBe(2)\nreturn nil\n",
            ),
            (
                "src/test.ts",
                "// header\n\nexpect(x).toBe(2);\nexport {};\n",
            ),
            ("out/gen.luau", "local t = {}\nexpect(t):toEqual({})\n"),
            ("lib/helper.lua", "return {}\n"),
        ] {
            let path = root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }

        let map = ModulePathMap::from_entries(
            root,
            [
                ModuleMapEntry {
                    runtime_address: "A.B.test".to_owned(),
                    compiled_path: root.join("out/test.luau"),
                    source_path: Some(root.join("src/test.ts")),
                },
                ModuleMapEntry {
                    runtime_address: "A.B.gen".to_owned(),
                    compiled_path: root.join("out/gen.luau"),
                    source_path: None,
                },
            ],
        );
        Fixture { dir, map }
    }

    #[test]
    fn rewrites_address_to_source() {
        let fixture = fixture();
        let mut rewriter = StackRewriter::new(&fixture.map);

        let rewritten = rewriter.rewrite_stack_string("Error at A.B.test:2");
        assert!(rewritten.contains("test.ts:3"), "{rewritten}");
        assert_eq!(
            rewritten,
            format!("Error at {}:3:11", fixture.root().join("src/test.ts"))
        );
    }

    #[test]
    fn rewrites_compiled_only_and_root_relative() {
        let fixture = fixture();
        let mut rewriter = StackRewriter::new(&fixture.map);
        let root = fixture.root();

        let rewritten = rewriter.rewrite_stack_string(indoc! {r#"
            [string "A.B.gen"]:2: bad
            out/gen.luau:1:4
            lib/helper.lua:1
            Missing.Module:9
        "#});
        assert_eq!(
            rewritten,
            format!(
                "{gen}:2:11: bad\n{gen}:1:4\n{helper}:1:1\nMissing.Module:9\n",
                gen = root.join("out/gen.luau"),
                helper = root.join("lib/helper.lua"),
            )
        );
    }

    #[test]
    fn strips_internal_frames() {
        let fixture = fixture();
        let mut rewriter = StackRewriter::new(&fixture.map);

        let input = indoc! {"
            Expected: 2
            Received: 1
                at ReplicatedStorage.Packages._Index.JestCircus:10
                at A.B.test:2
            ReplicatedStorage.DevPackages.LuauPolyfill.Error:5 function new
            message mentions Packages.thing:3 inline
        "};
        let result = rewriter.rewrite(input);
        assert_eq!(result.stripped, 2);
        assert_eq!(result.frames.len(), 1);
        assert_eq!(
            result.text,
            format!(
                "Expected: 2\nReceived: 1\n    at {}:3:11\nmessage mentions Packages.thing:3 inline\n",
                fixture.root().join("src/test.ts")
            )
        );

        rewriter.set_strip_internal(false);
        let kept = rewriter.rewrite(input);
        assert_eq!(kept.stripped, 0);
        assert!(kept.text.contains("JestCircus:10"));
    }

    #[test]
    fn custom_internal_patterns() {
        let patterns = InternalFramePatterns::default().with_patterns(["Vendor"]);
        assert!(patterns.is_internal("ReplicatedStorage.Vendor.x"));
        assert!(patterns.is_internal("/p/node_modules/x.lua"));
        assert!(!InternalFramePatterns::new(Vec::<String>::new()).is_internal("node_modules"));
    }

    #[test]
    fn rewrite_is_idempotent() {
        let fixture = fixture();
        let mut rewriter = StackRewriter::new(&fixture.map);

        let input = "Error at A.B.test:2\n  at A.B.gen:2\n  at out/gen.luau:1:4\n  lib/helper.lua:1\n";
        let once = rewriter.rewrite_stack_string(input);
        let twice = rewriter.rewrite_stack_string(&once);
        assert_eq!(once, twice);
    }

    /// Fragments that look like locations but name no module or file in the fixture project.
    const NEAR_MISSES: &[&str] = &[
        "12:30",
        "v1.2:3",
        "host:8080",
        "localhost:8080/health",
        "a.b",
        "A.B.test",
        "ratio 3:2",
        "Expected: 2",
        "Missing.Module:9",
        "A.B:3",
        "src/absent.ts:2:5",
        "lib/none.lua:1",
        "[string \"A.B.gone\"]:4:",
        "[string \"unterminated",
        "at Gone.Away:7",
        "\u{1b}[31mRed.Thing:3\u{1b}[0m",
    ];

    const SEPARATORS: &[&str] = &[" ", ", ", "\n", "\n    at ", " (", ") "];

    proptest! {
        #[test]
        fn unresolvable_text_is_unchanged(
            parts in prop::collection::vec(
                (prop::sample::select(NEAR_MISSES), prop::sample::select(SEPARATORS)),
                0..24,
            ),
        ) {
            let text: String = parts
                .iter()
                .flat_map(|(fragment, separator)| [*fragment, *separator])
                .collect();
            let fixture = fixture();
            let mut rewriter = StackRewriter::new(&fixture.map);
            rewriter.set_strip_internal(false);

            let result = rewriter.rewrite(&text);
            prop_assert!(result.frames.is_empty(), "{:?}", result.frames);
            prop_assert_eq!(result.text, text);
        }
    }
}
