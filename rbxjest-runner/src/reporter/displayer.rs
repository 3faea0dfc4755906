// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable reporters.

use super::{Reporter, ReporterCapabilities, ReporterOptions, io_error};
use crate::{errors::ReporterError, helpers::display_relative};
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use owo_colors::{OwoColorize, Style};
use rbxjest_metadata::{AggregatedResult, AssertionStatus, TestFileResult};
use serde_json::Value;
use std::io::Write;
use swrite::{SWrite, swrite};

/// Prints a PASS or FAIL line per test file, the failures within it, and a summary at the end.
#[derive(Debug)]
pub struct DefaultReporter {
    project_root: Utf8PathBuf,
    styles: Styles,
}

impl DefaultReporter {
    /// The registered name.
    pub const NAME: &'static str = "default";

    /// Creates a new reporter.
    pub fn new(options: &ReporterOptions) -> Self {
        Self {
            project_root: options.project_root.clone(),
            styles: Styles::new(options.colorize),
        }
    }
}

impl Reporter for DefaultReporter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn capabilities(&self) -> ReporterCapabilities {
        ReporterCapabilities::TEST_RESULT | ReporterCapabilities::RUN_COMPLETE
    }

    fn on_test_result(
        &mut self,
        suite: &TestFileResult,
        _results: &AggregatedResult,
        out: &mut dyn Write,
    ) -> Result<(), ReporterError> {
        let mut s = String::new();
        write_suite_str(suite, &self.project_root, &self.styles, &mut s);
        out.write_all(s.as_bytes()).map_err(io_error(Self::NAME))
    }

    fn on_run_complete(
        &mut self,
        results: &AggregatedResult,
        _global_config: Option<&Value>,
        out: &mut dyn Write,
    ) -> Result<(), ReporterError> {
        let mut s = String::new();
        if !results.test_results.is_empty() {
            s.push('\n');
        }
        write_summary_str(results, &self.styles, &mut s);
        out.write_all(s.as_bytes()).map_err(io_error(Self::NAME))
    }
}

/// Prints only the summary at the end of the run.
#[derive(Debug)]
pub struct SummaryReporter {
    styles: Styles,
}

impl SummaryReporter {
    /// The registered name.
    pub const NAME: &'static str = "summary";

    /// Creates a new reporter.
    pub fn new(options: &ReporterOptions) -> Self {
        Self {
            styles: Styles::new(options.colorize),
        }
    }
}

impl Reporter for SummaryReporter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn capabilities(&self) -> ReporterCapabilities {
        ReporterCapabilities::RUN_COMPLETE
    }

    fn on_run_complete(
        &mut self,
        results: &AggregatedResult,
        _global_config: Option<&Value>,
        out: &mut dyn Write,
    ) -> Result<(), ReporterError> {
        let mut s = String::new();
        write_summary_str(results, &self.styles, &mut s);
        out.write_all(s.as_bytes()).map_err(io_error(Self::NAME))
    }
}

#[derive(Clone, Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    header: Style,
}

impl Styles {
    fn new(colorize: bool) -> Self {
        let mut styles = Self::default();
        if colorize {
            styles.colorize();
        }
        styles
    }

    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.header = Style::new().bold();
    }
}

fn write_suite_str(suite: &TestFileResult, root: &Utf8Path, styles: &Styles, out: &mut String) {
    let path = display_relative(&suite.test_file_path, root);
    if suite.has_failures() {
        swrite!(out, "{} {}\n", "FAIL".style(styles.fail), path.style(styles.header));
    } else {
        swrite!(out, "{} {}\n", "PASS".style(styles.pass), path.style(styles.header));
    }

    let mut wrote_case = false;
    for case in &suite.test_results {
        if case.status != AssertionStatus::Failed || case.failure_messages.is_empty() {
            continue;
        }
        wrote_case = true;
        let name = case
            .ancestor_titles
            .iter()
            .chain(std::iter::once(&case.title))
            .join(" › ");
        swrite!(out, "\n  {} {}\n\n", "●".style(styles.fail), name.style(styles.fail));
        for message in &case.failure_messages {
            write_indented(message, 4, out);
        }
    }

    if !wrote_case
        && let Some(message) = suite.failure_message.as_deref().filter(|m| !m.trim().is_empty())
    {
        out.push('\n');
        write_indented(message, 2, out);
    }
}

fn write_indented(text: &str, indent: usize, out: &mut String) {
    for line in text.trim_end().lines() {
        if line.is_empty() {
            out.push('\n');
        } else {
            swrite!(out, "{:indent$}{line}\n", "");
        }
    }
    out.push('\n');
}

fn write_summary_str(results: &AggregatedResult, styles: &Styles, out: &mut String) {
    let suites_failed = results.num_failed_test_suites + results.num_runtime_error_test_suites;
    let mut suites = Vec::new();
    push_count(&mut suites, suites_failed, "failed", styles.fail, styles);
    push_count(&mut suites, results.num_pending_test_suites, "skipped", styles.skip, styles);
    push_count(&mut suites, results.num_passed_test_suites, "passed", styles.pass, styles);
    suites.push(format!("{} total", results.num_total_test_suites));
    swrite!(out, "{} {}\n", "Test Suites:".style(styles.header), suites.join(", "));

    let mut tests = Vec::new();
    push_count(&mut tests, results.num_failed_tests, "failed", styles.fail, styles);
    push_count(&mut tests, results.num_pending_tests, "skipped", styles.skip, styles);
    push_count(&mut tests, results.num_todo_tests, "todo", styles.skip, styles);
    push_count(&mut tests, results.num_passed_tests, "passed", styles.pass, styles);
    tests.push(format!("{} total", results.num_total_tests));
    swrite!(out, "{}       {}\n", "Tests:".style(styles.header), tests.join(", "));

    let snapshot = &results.snapshot;
    let mut snapshots = Vec::new();
    push_count(&mut snapshots, snapshot.unmatched, "failed", styles.fail, styles);
    push_count(&mut snapshots, snapshot.unchecked, "obsolete", styles.skip, styles);
    push_count(&mut snapshots, snapshot.added, "written", styles.pass, styles);
    push_count(&mut snapshots, snapshot.updated, "updated", styles.pass, styles);
    push_count(&mut snapshots, snapshot.matched, "passed", styles.pass, styles);
    snapshots.push(format!("{} total", snapshot.total));
    swrite!(out, "{}   {}\n", "Snapshots:".style(styles.header), snapshots.join(", "));
}

fn push_count(parts: &mut Vec<String>, count: usize, label: &str, style: Style, styles: &Styles) {
    if count > 0 {
        parts.push(format!("{} {}", count.style(styles.count), label.style(style)));
    }
}
