// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JUnit XML output.

use super::{Reporter, ReporterCapabilities, ReporterOptions};
use crate::{errors::ReporterError, helpers::display_relative};
use camino::Utf8PathBuf;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use rbxjest_metadata::{AggregatedResult, AssertionResult, AssertionStatus, TestFileResult};
use serde_json::Value;
use std::{fs::File, io::Write, time::Duration};

/// Writes a JUnit XML report with one test suite per test file.
#[derive(Debug)]
pub struct JunitReporter {
    project_root: Utf8PathBuf,
    path: Utf8PathBuf,
}

impl JunitReporter {
    /// The registered name.
    pub const NAME: &'static str = "junit";

    /// The report file used when none is configured, relative to the project root.
    pub const DEFAULT_PATH: &'static str = "junit.xml";

    /// The name of the report.
    const REPORT_NAME: &'static str = "rbxjest";

    /// Creates a new reporter.
    pub fn new(options: &ReporterOptions) -> Self {
        let path = match &options.junit_output {
            Some(path) => options.resolve(path),
            None => options.project_root.join(Self::DEFAULT_PATH),
        };
        Self {
            project_root: options.project_root.clone(),
            path,
        }
    }

    fn make_report(&self, results: &AggregatedResult) -> Report {
        let mut report = Report::new(Self::REPORT_NAME);
        report.add_test_suites(
            results
                .test_results
                .iter()
                .map(|suite| self.make_suite(suite)),
        );
        report
    }

    fn make_suite(&self, suite: &TestFileResult) -> TestSuite {
        let name = display_relative(&suite.test_file_path, &self.project_root);
        let mut test_suite = TestSuite::new(name.as_str());
        for case in &suite.test_results {
            test_suite.add_test_case(make_case(&name, case));
        }

        // A file that failed to load has no test cases but still needs to show up as a failure.
        if suite.test_results.is_empty()
            && let Some(message) = suite.failure_message.as_deref().filter(|m| !m.is_empty())
        {
            let mut status = TestCaseStatus::non_success(NonSuccessKind::Error);
            set_failure_text(&mut status, &[message.to_owned()]);
            let mut test_case = TestCase::new(name.as_str(), status);
            test_case.set_classname(name.as_str());
            test_suite.add_test_case(test_case);
        }
        test_suite
    }
}

fn make_case(classname: &str, case: &AssertionResult) -> TestCase {
    let status = match case.status {
        AssertionStatus::Passed | AssertionStatus::Focused => TestCaseStatus::success(),
        AssertionStatus::Failed => {
            let mut status = TestCaseStatus::non_success(NonSuccessKind::Failure);
            set_failure_text(&mut status, &case.failure_messages);
            status
        }
        AssertionStatus::Skipped
        | AssertionStatus::Pending
        | AssertionStatus::Todo
        | AssertionStatus::Disabled => TestCaseStatus::skipped(),
    };

    let name = if case.full_name.is_empty() {
        case.title.as_str()
    } else {
        case.full_name.as_str()
    };
    let mut test_case = TestCase::new(name, status);
    test_case.set_classname(classname);
    if let Some(duration) = case.duration.filter(|d| d.is_finite() && *d >= 0.0) {
        test_case.set_time(Duration::from_secs_f64(duration / 1000.0));
    }
    test_case
}

fn set_failure_text(status: &mut TestCaseStatus, messages: &[String]) {
    let description = messages
        .iter()
        .map(|message| strip_ansi_escapes::strip_str(message))
        .collect::<Vec<_>>()
        .join("\n\n");
    let message = description.lines().next().unwrap_or_default().trim().to_owned();
    status.set_message(message);
    status.set_description(description);
}

impl Reporter for JunitReporter {
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
        _out: &mut dyn Write,
    ) -> Result<(), ReporterError> {
        let report = self.make_report(results);

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|error| ReporterError::Fs {
                file: dir.to_owned(),
                error,
            })?;
        }
        let f = File::create(&self.path).map_err(|error| ReporterError::Fs {
            file: self.path.clone(),
            error,
        })?;
        report.serialize(f).map_err(|error| ReporterError::Junit {
            file: self.path.clone(),
            error,
        })
    }
}
