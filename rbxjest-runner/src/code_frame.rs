// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Code frames: excerpts of source around a failure location.

use crate::stack::{ResolvedFrame, is_stack_frame_line};
use owo_colors::{OwoColorize, Style};
use swrite::{SWrite, swrite};

/// Tabs are rendered as this many spaces.
pub const TAB_WIDTH: usize = 2;

/// The default number of lines shown on either side of the target line.
pub const DEFAULT_CONTEXT_LINES: usize = 2;

const PUNCTUATION: &str = "()[]{}.,;:+-*/%=<>!&|^~#?";

/// Styles used when rendering code frames.
#[derive(Clone, Debug, Default)]
pub struct CodeFrameStyles {
    is_colorized: bool,
    gutter: Style,
    marker: Style,
    string: Style,
    number: Style,
    punctuation: Style,
}

impl CodeFrameStyles {
    /// Enables colors.
    pub fn colorize(&mut self) {
        self.is_colorized = true;
        self.gutter = Style::new().dimmed();
        self.marker = Style::new().red().bold();
        self.string = Style::new().green();
        self.number = Style::new().magenta();
        self.punctuation = Style::new().yellow();
    }
}

/// Renders code frames.
#[derive(Clone, Debug)]
pub struct CodeFrameBuilder {
    context_lines: usize,
    styles: CodeFrameStyles,
}

impl Default for CodeFrameBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_LINES)
    }
}

impl CodeFrameBuilder {
    /// Creates a builder showing `context_lines` lines on either side of the target.
    pub fn new(context_lines: usize) -> Self {
        Self {
            context_lines,
            styles: CodeFrameStyles::default(),
        }
    }

    /// Sets the styles.
    pub fn set_styles(&mut self, styles: CodeFrameStyles) -> &mut Self {
        self.styles = styles;
        self
    }

    /// Enables colors.
    pub fn colorize(&mut self) -> &mut Self {
        self.styles.colorize();
        self
    }

    /// Renders the lines around `line` (1-based) of a file, marking `column` (1-based).
    ///
    /// Returns `None` if `line` is outside the file.
    pub fn build(&self, lines: &[String], line: usize, column: usize) -> Option<String> {
        if line == 0 || line > lines.len() {
            return None;
        }
        let start = line.saturating_sub(self.context_lines).max(1);
        let end = line.saturating_add(self.context_lines).min(lines.len());
        let width = end.to_string().len();
        let styles = &self.styles;

        let mut out = String::new();
        for number in start..=end {
            if number > start {
                out.push('\n');
            }
            let text = &lines[number - 1];
            let is_target = number == line;
            let marker = if is_target { ">" } else { " " };
            swrite!(
                out,
                "{} {}",
                marker.style(styles.marker),
                format!("{number:>width$} |").style(styles.gutter),
            );
            let expanded = text.replace('\t', &" ".repeat(TAB_WIDTH));
            if !expanded.is_empty() {
                out.push(' ');
                self.highlight_into(&mut out, &expanded);
            }

            if is_target {
                let padding: usize = text
                    .chars()
                    .take(column.max(1) - 1)
                    .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
                    .sum();
                swrite!(
                    out,
                    "\n  {} {}{}",
                    format!("{:width$} |", "").style(styles.gutter),
                    " ".repeat(padding),
                    "^".style(styles.marker),
                );
            }
        }
        Some(out)
    }

    fn highlight_into(&self, out: &mut String, text: &str) {
        let styles = &self.styles;
        if !styles.is_colorized {
            out.push_str(text);
            return;
        }

        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let byte_at = |index: usize| chars.get(index).map_or(text.len(), |(byte, _)| *byte);
        let mut index = 0;
        while index < chars.len() {
            let start = index;
            let c = chars[index].1;
            index += 1;

            let style = if matches!(c, '"' | '\'' | '`') {
                while index < chars.len() && chars[index].1 != c {
                    if chars[index].1 == '\\' {
                        index += 1;
                    }
                    index += 1;
                }
                index = (index + 1).min(chars.len());
                Some(styles.string)
            } else if c.is_ascii_digit() {
                while index < chars.len()
                    && (chars[index].1.is_ascii_alphanumeric() || matches!(chars[index].1, '.' | '_'))
                {
                    index += 1;
                }
                Some(styles.number)
            } else if c.is_alphabetic() || c == '_' {
                // Identifiers are consumed whole so that digits inside them aren't highlighted.
                while index < chars.len() && (chars[index].1.is_alphanumeric() || chars[index].1 == '_')
                {
                    index += 1;
                }
                None
            } else if PUNCTUATION.contains(c) {
                Some(styles.punctuation)
            } else {
                None
            };

            let segment = &text[byte_at(start)..byte_at(index)];
            match style {
                Some(style) => swrite!(out, "{}", segment.style(style)),
                None => out.push_str(segment),
            }
        }
    }
}

/// Places `code_frame` after the description in `text` and moves the stack lines for `frame`
/// directly below it, followed by the rest of the stack.
///
/// Text that already contains `code_frame` is returned unchanged.
pub fn inject_code_frame(text: &str, frame: &ResolvedFrame, code_frame: &str) -> String {
    if code_frame.is_empty() || text.contains(code_frame) {
        return text.to_owned();
    }

    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let stack_start = lines
        .iter()
        .position(|line| is_stack_frame_line(line.trim_end_matches(['\r', '\n'])))
        .unwrap_or(lines.len());
    let (description, stack) = lines.split_at(stack_start);

    let target = frame.to_string();
    let (relocated, rest): (Vec<&str>, Vec<&str>) = stack
        .iter()
        .copied()
        .partition(|line| line.contains(target.as_str()));

    let mut out = description.concat().trim_end().to_owned();
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str(code_frame);
    out.push('\n');
    if !stack.is_empty() {
        out.push('\n');
        for line in relocated.iter().chain(&rest) {
            out.push_str(line);
            if !line.ends_with('\n') {
                out.push('\n');
            }
        }
    }
    if !text.ends_with('\n') {
        out.truncate(out.trim_end_matches('\n').len());
    }
    out
}
