// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running a project's tests from end to end.

use crate::{
    aggregate::{MergedRun, merge_run_outputs},
    config::RbxJestConfig,
    coverage::rewrite_coverage_data,
    discovery::TestDiscovery,
    errors::{DiscoveryError, ModuleMapBuildError, RunError},
    helpers::plural,
    module_map::{ModulePathMap, ModulePathMapBuilder},
    partition::{RunPlan, unique_module_files},
    reporter::{ReporterOptions, ReporterRegistry},
    rewrite::ResultRewriter,
    runner::{ExecutionBackend, TestRunnerBuilder},
};
use camino::{Utf8Path, Utf8PathBuf};
use rbxjest_metadata::{AggregatedResult, CoverageMap, RbxJestExitCode};
use serde_json::Value;
use std::io::Write;
use tracing::{debug, info};

/// A run of a project's tests.
#[derive(Debug)]
pub struct TestRun<'cfg> {
    project_root: Utf8PathBuf,
    config: &'cfg RbxJestConfig,
    colorize: bool,
}

impl<'cfg> TestRun<'cfg> {
    /// Creates a run for the project at `project_root`.
    pub fn new(project_root: impl Into<Utf8PathBuf>, config: &'cfg RbxJestConfig) -> Self {
        Self {
            project_root: project_root.into(),
            config,
            colorize: false,
        }
    }

    /// Enables syntax highlighting in code frames.
    pub fn set_colorize(&mut self, colorize: bool) -> &mut Self {
        self.colorize = colorize;
        self
    }

    /// Returns the project root.
    pub fn project_root(&self) -> &Utf8Path {
        &self.project_root
    }

    /// Builds the module path map from the project's sourcemap.
    pub fn build_module_map(&self) -> Result<ModulePathMap, ModuleMapBuildError> {
        let project = &self.config.project;
        let mut builder = ModulePathMapBuilder::new(self.project_root.clone());
        builder
            .set_source_root(&project.source_root)
            .set_output_root(&project.output_root);
        builder.build_from_file(&project.sourcemap)
    }

    /// Finds the project's test files.
    pub fn discover(&self) -> Result<Vec<Utf8PathBuf>, DiscoveryError> {
        let discovery = &self.config.discovery;
        TestDiscovery::new(
            self.project_root.clone(),
            &discovery.test_match,
            &discovery.test_path_ignore,
        )?
        .discover()
    }

    /// Runs the tests through `backend` and returns results mapped back to source.
    ///
    /// If no test files are discovered, the backend is never invoked.
    pub fn execute<B: ExecutionBackend>(&self, backend: &B) -> Result<RunOutcome, RunError> {
        let files = self.discover()?;
        if files.is_empty() {
            info!(root = %self.project_root, "no test files found");
            return Ok(RunOutcome::no_tests());
        }
        let map = self.build_module_map()?;
        let discovered = files.len();
        let files = unique_module_files(&map, &files);
        if files.len() < discovered {
            debug!(
                discovered,
                modules = files.len(),
                "collapsed compiled and source files for the same modules"
            );
        }

        let workers = self.config.run.workers.compute();
        let plan = RunPlan::new(&map, &files, workers);
        debug!(
            files = files.len(),
            executions = plan.execution_count(),
            "planned {} {} across {} {}",
            files.len(),
            plural::files_str(files.len()),
            plan.execution_count(),
            plural::shards_str(plan.execution_count()),
        );

        let mut builder = TestRunnerBuilder::default();
        builder
            .set_workers(workers)
            .set_keep_temp(self.config.run.keep_temp);
        let runner = builder.build()?;
        let outputs = runner.execute(backend, &plan)?;

        let MergedRun {
            mut results,
            global_config,
            coverage,
        } = merge_run_outputs(outputs);

        let options = self.config.rewrite.to_options(self.colorize);
        ResultRewriter::new(&map, &options).rewrite_results(&mut results);
        let coverage = coverage.map(|coverage| rewrite_coverage_data(&map, coverage));

        Ok(RunOutcome {
            results,
            global_config,
            coverage,
            discovered: files.len(),
        })
    }
}

/// The rewritten results of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunOutcome {
    /// Results, with every path referring to a file on disk.
    pub results: AggregatedResult,

    /// Jest's global config, if reported.
    pub global_config: Option<Value>,

    /// Coverage keyed by absolute compiled file path, if collected.
    pub coverage: Option<CoverageMap>,

    /// The number of distinct test modules discovered.
    pub discovered: usize,
}

impl RunOutcome {
    fn no_tests() -> Self {
        Self {
            results: AggregatedResult::empty_success(),
            global_config: None,
            coverage: None,
            discovered: 0,
        }
    }

    /// Returns the exit code a process should terminate with for this outcome.
    pub fn exit_code(&self, pass_with_no_tests: bool) -> i32 {
        if self.discovered == 0 && !pass_with_no_tests {
            RbxJestExitCode::NO_TESTS_RUN
        } else if self.results.success {
            RbxJestExitCode::OK
        } else {
            RbxJestExitCode::TEST_RUN_FAILED
        }
    }
}

/// Runs the reporters enabled in `config` over `outcome`, writing to `out`.
pub fn report_outcome(
    outcome: &RunOutcome,
    registry: &ReporterRegistry,
    config: &RbxJestConfig,
    options: &ReporterOptions,
    out: &mut dyn Write,
) -> Result<(), RunError> {
    let mut dispatcher = registry.create_all(&config.reporters.enabled, options)?;
    dispatcher.report(&outcome.results, outcome.global_config.as_ref(), out)?;
    Ok(())
}

/// Returns reporter options derived from `config`.
pub fn reporter_options(
    project_root: &Utf8Path,
    config: &RbxJestConfig,
    colorize: bool,
) -> ReporterOptions {
    ReporterOptions {
        colorize,
        project_root: project_root.to_owned(),
        json_output: config.reporters.json_output.clone(),
        junit_output: config.reporters.junit_output.clone(),
    }
}
