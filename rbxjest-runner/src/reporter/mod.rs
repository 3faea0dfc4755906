// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporting rewritten results.
//!
//! A [`Reporter`] receives the results of a run through a Jest-style lifecycle: once at the start
//! of the run, once per test file, and once when the run completes. Reporters declare which of
//! these calls they handle through [`ReporterCapabilities`], and are looked up by name in a
//! [`ReporterRegistry`].

mod displayer;
mod junit;
mod registry;
mod structured;

pub use displayer::{DefaultReporter, SummaryReporter};
pub use junit::JunitReporter;
pub use registry::{ReporterFactory, ReporterRegistry};
pub use structured::JsonReporter;

use crate::errors::ReporterError;
use bitflags::bitflags;
use camino::{Utf8Path, Utf8PathBuf};
use rbxjest_metadata::{AggregatedResult, TestFileResult};
use serde_json::Value;
use std::io::Write;

bitflags! {
    /// The lifecycle calls a reporter handles.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ReporterCapabilities: u8 {
        /// [`Reporter::on_run_start`].
        const RUN_START = 1 << 0;

        /// [`Reporter::on_test_start`].
        const TEST_START = 1 << 1;

        /// [`Reporter::on_test_result`].
        const TEST_RESULT = 1 << 2;

        /// [`Reporter::on_run_complete`].
        const RUN_COMPLETE = 1 << 3;
    }
}

/// Receives the results of a run.
///
/// Every lifecycle method defaults to doing nothing. Only the calls named in
/// [`capabilities`](Self::capabilities) are made.
pub trait Reporter {
    /// The name this reporter is registered under.
    fn name(&self) -> &str;

    /// The lifecycle calls this reporter handles.
    fn capabilities(&self) -> ReporterCapabilities;

    /// Called once before any per-file call.
    fn on_run_start(
        &mut self,
        results: &AggregatedResult,
        out: &mut dyn Write,
    ) -> Result<(), ReporterError> {
        let _ = (results, out);
        Ok(())
    }

    /// Called once per test file, for reporters that don't handle
    /// [`on_test_result`](Self::on_test_result).
    fn on_test_start(&mut self, test_path: &str, out: &mut dyn Write) -> Result<(), ReporterError> {
        let _ = (test_path, out);
        Ok(())
    }

    /// Called once per test file with that file's results.
    fn on_test_result(
        &mut self,
        suite: &TestFileResult,
        results: &AggregatedResult,
        out: &mut dyn Write,
    ) -> Result<(), ReporterError> {
        let _ = (suite, results, out);
        Ok(())
    }

    /// Called once after every per-file call.
    fn on_run_complete(
        &mut self,
        results: &AggregatedResult,
        global_config: Option<&Value>,
        out: &mut dyn Write,
    ) -> Result<(), ReporterError> {
        let _ = (results, global_config, out);
        Ok(())
    }
}

/// Settings shared by the built-in reporters.
#[derive(Clone, Debug, Default)]
pub struct ReporterOptions {
    /// Whether to emit ANSI colors.
    pub colorize: bool,

    /// The project root. Paths under it are displayed relative to it, and relative output paths
    /// are joined to it.
    pub project_root: Utf8PathBuf,

    /// Where the `json` reporter writes. Standard output if unset.
    pub json_output: Option<Utf8PathBuf>,

    /// Where the `junit` reporter writes.
    pub junit_output: Option<Utf8PathBuf>,
}

impl ReporterOptions {
    fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        self.project_root.join(path)
    }
}

/// Drives a set of reporters through the lifecycle of a run.
pub struct ReporterDispatcher {
    reporters: Vec<Box<dyn Reporter>>,
}

impl std::fmt::Debug for ReporterDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.reporters.iter().map(|r| r.name()))
            .finish()
    }
}

impl ReporterDispatcher {
    /// Creates a dispatcher for `reporters`, which are called in order.
    pub fn new(reporters: Vec<Box<dyn Reporter>>) -> Self {
        Self { reporters }
    }

    /// Returns the names of the reporters, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.reporters.iter().map(|r| r.name())
    }

    /// Reports a completed run.
    ///
    /// Each phase runs for every reporter before the next phase starts. For each test file, a
    /// reporter gets [`Reporter::on_test_result`] if it handles it, and
    /// [`Reporter::on_test_start`] otherwise.
    pub fn report(
        &mut self,
        results: &AggregatedResult,
        global_config: Option<&Value>,
        out: &mut dyn Write,
    ) -> Result<(), ReporterError> {
        for reporter in &mut self.reporters {
            if reporter.capabilities().contains(ReporterCapabilities::RUN_START) {
                reporter.on_run_start(results, out)?;
            }
        }

        for suite in &results.test_results {
            for reporter in &mut self.reporters {
                let capabilities = reporter.capabilities();
                if capabilities.contains(ReporterCapabilities::TEST_RESULT) {
                    reporter.on_test_result(suite, results, out)?;
                } else if capabilities.contains(ReporterCapabilities::TEST_START) {
                    reporter.on_test_start(&suite.test_file_path, out)?;
                }
            }
        }

        for reporter in &mut self.reporters {
            if reporter.capabilities().contains(ReporterCapabilities::RUN_COMPLETE) {
                reporter.on_run_complete(results, global_config, out)?;
            }
        }
        out.flush().map_err(|error| ReporterError::Io {
            reporter: "dispatcher".to_owned(),
            error,
        })
    }
}

/// Maps an I/O error from writing to the output stream.
pub(crate) fn io_error(reporter: &str) -> impl FnOnce(std::io::Error) -> ReporterError + '_ {
    move |error| ReporterError::Io {
        reporter: reporter.to_owned(),
        error,
    }
}
