// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Results for an entire run, in the shape of Jest's `AggregatedResult`.
///
/// Produced by the in-runtime harness once per execution, and synthesized by merging when a run is
/// spread across several workers.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResult {
    /// The number of test files with at least one failing test.
    #[serde(default)]
    pub num_failed_test_suites: usize,

    /// The number of failing tests.
    #[serde(default)]
    pub num_failed_tests: usize,

    /// The number of test files where every test passed.
    #[serde(default)]
    pub num_passed_test_suites: usize,

    /// The number of passing tests.
    #[serde(default)]
    pub num_passed_tests: usize,

    /// The number of test files where every test was skipped.
    #[serde(default)]
    pub num_pending_test_suites: usize,

    /// The number of skipped tests.
    #[serde(default)]
    pub num_pending_tests: usize,

    /// The number of test files that failed to run at all.
    #[serde(default)]
    pub num_runtime_error_test_suites: usize,

    /// The number of tests marked as todo.
    #[serde(default)]
    pub num_todo_tests: usize,

    /// The total number of test files.
    #[serde(default)]
    pub num_total_test_suites: usize,

    /// The total number of tests.
    #[serde(default)]
    pub num_total_tests: usize,

    /// Snapshot statistics for the run.
    #[serde(default)]
    pub snapshot: SnapshotSummary,

    /// The start time of the run, in milliseconds since the Unix epoch.
    #[serde(default)]
    pub start_time: f64,

    /// True if the run succeeded.
    #[serde(default)]
    pub success: bool,

    /// Per-file results.
    #[serde(default)]
    pub test_results: Vec<TestFileResult>,

    /// True if the run was interrupted.
    #[serde(default)]
    pub was_interrupted: bool,

    /// Fields not modeled here, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AggregatedResult {
    /// Returns an empty result for a run that executed nothing.
    ///
    /// Such a run is considered successful.
    pub fn empty_success() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }
}

/// Snapshot statistics, in the shape of Jest's `SnapshotSummary`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    /// Snapshots written for the first time.
    #[serde(default)]
    pub added: usize,

    /// True if any snapshot was updated.
    #[serde(default)]
    pub did_update: bool,

    /// True if snapshot handling failed.
    #[serde(default)]
    pub failure: bool,

    /// Snapshot files created.
    #[serde(default)]
    pub files_added: usize,

    /// Snapshot files removed.
    #[serde(default)]
    pub files_removed: usize,

    /// Paths of snapshot files removed.
    #[serde(default)]
    pub files_removed_list: Vec<String>,

    /// Snapshot files with at least one mismatch.
    #[serde(default)]
    pub files_unmatched: usize,

    /// Snapshot files updated.
    #[serde(default)]
    pub files_updated: usize,

    /// Snapshots that matched.
    #[serde(default)]
    pub matched: usize,

    /// Total snapshots checked.
    #[serde(default)]
    pub total: usize,

    /// Obsolete snapshots.
    #[serde(default)]
    pub unchecked: usize,

    /// Obsolete snapshot keys, grouped by file.
    #[serde(default)]
    pub unchecked_keys_by_file: Vec<UncheckedSnapshot>,

    /// Snapshots that did not match.
    #[serde(default)]
    pub unmatched: usize,

    /// Snapshots updated.
    #[serde(default)]
    pub updated: usize,
}

/// Obsolete snapshot keys within a single file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UncheckedSnapshot {
    /// The snapshot file.
    pub file_path: String,

    /// The obsolete keys.
    #[serde(default)]
    pub keys: Vec<String>,
}

/// Results for a single test file (suite), in the shape of Jest's `TestResult`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestFileResult {
    /// The path of the test file.
    ///
    /// As reported by the runtime this is an instance path; after rewriting it is an absolute path
    /// on disk.
    pub test_file_path: String,

    /// Results for each test case in the file.
    #[serde(default)]
    pub test_results: Vec<AssertionResult>,

    /// A combined, pre-formatted failure message for the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,

    /// The number of failing tests in this file.
    #[serde(default)]
    pub num_failing_tests: usize,

    /// The number of passing tests in this file.
    #[serde(default)]
    pub num_passing_tests: usize,

    /// The number of skipped tests in this file.
    #[serde(default)]
    pub num_pending_tests: usize,

    /// The number of todo tests in this file.
    #[serde(default)]
    pub num_todo_tests: usize,

    /// Fields not modeled here, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TestFileResult {
    /// Returns true if this file has a failing test or a file-level failure message.
    pub fn has_failures(&self) -> bool {
        self.num_failing_tests > 0
            || self.failure_message.as_deref().is_some_and(|m| !m.is_empty())
            || self.test_results.iter().any(|r| r.status.is_failure())
    }
}

/// The result of a single test case, in the shape of Jest's `AssertionResult`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResult {
    /// The test's own title.
    pub title: String,

    /// The title including all enclosing `describe` blocks.
    #[serde(default)]
    pub full_name: String,

    /// Titles of the enclosing `describe` blocks, outermost first.
    #[serde(default)]
    pub ancestor_titles: Vec<String>,

    /// The outcome.
    pub status: AssertionStatus,

    /// Failure messages, one per failed assertion or error.
    #[serde(default)]
    pub failure_messages: Vec<String>,

    /// Where the test is declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<CallSite>,

    /// Time taken, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    /// Fields not modeled here, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A 1-based line and column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CallSite {
    /// The line, starting from 1.
    pub line: usize,

    /// The column, starting from 1.
    pub column: usize,
}

/// The outcome of a single test case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionStatus {
    /// The test passed.
    Passed,

    /// The test failed.
    Failed,

    /// The test was skipped.
    Skipped,

    /// The test is pending.
    Pending,

    /// The test is a todo.
    Todo,

    /// The test was disabled.
    Disabled,

    /// The test was focused.
    Focused,
}

impl AssertionStatus {
    /// Returns true if this status represents a failure.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for AssertionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Pending => write!(f, "pending"),
            Self::Todo => write!(f, "todo"),
            Self::Disabled => write!(f, "disabled"),
            Self::Focused => write!(f, "focused"),
        }
    }
}
