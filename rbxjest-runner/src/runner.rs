// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test runner.
//!
//! The main structure in this module is [`TestRunner`]. It takes a [`RunPlan`] and drives one
//! execution per shard through an [`ExecutionBackend`], concurrently, returning the parsed output
//! of each in shard order.

use crate::{
    config::RunConfig,
    errors::{BackendError, RunError, ShardExecuteError, TestRunnerBuildError},
    output::{RawRunOutput, parse_run_output},
    partition::{RunPlan, ShardFilter, ShardId},
};
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use futures::{StreamExt, TryStreamExt};
use std::{future::Future, process::Stdio, time::Duration};
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// A single execution of the test harness.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// The shard being executed.
    pub shard: ShardId,

    /// Restricts the execution to the shard's files. `None` runs everything.
    pub filter: Option<ShardFilter>,

    /// A unique file the backend may use to capture output.
    pub log_path: Utf8PathBuf,
}

/// What an execution produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// The exit code, or `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,

    /// Everything the harness printed.
    pub output: String,
}

/// Runs the in-runtime test harness.
pub trait ExecutionBackend {
    /// Performs one execution.
    fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> impl Future<Output = Result<ExecutionOutput, BackendError>>;
}

/// An [`ExecutionBackend`] that spawns a command line and captures its output in the request's
/// log file.
#[derive(Clone, Debug)]
pub struct ProcessBackend {
    program: String,
    args: Vec<String>,
    cwd: Utf8PathBuf,
    timeout: Duration,
}

impl ProcessBackend {
    /// Creates a backend from the `[run]` config section.
    ///
    /// `{script}` and `{target}` in the command line are replaced with the configured paths,
    /// joined under `project_root`.
    pub fn from_config(project_root: &Utf8Path, config: &RunConfig) -> Result<Self, BackendError> {
        let script = project_root.join(&config.script);
        let target = project_root.join(&config.target);
        let mut command = config.command.iter().map(|arg| {
            arg.replace("{script}", script.as_str())
                .replace("{target}", target.as_str())
        });
        let program = command.next().ok_or_else(|| BackendError::Other {
            message: "run.command is empty".to_owned(),
        })?;

        Ok(Self {
            program,
            args: command.collect(),
            cwd: project_root.to_owned(),
            timeout: config.timeout,
        })
    }

    /// Returns the program that is spawned.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the arguments passed to the program.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Sets the timeout for each execution.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }
}

impl ExecutionBackend for ProcessBackend {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutput, BackendError> {
        let log_create = |error| BackendError::LogCreate {
            path: request.log_path.clone(),
            error,
        };
        let stdout = std::fs::File::create(&request.log_path).map_err(log_create)?;
        let stderr = stdout.try_clone().map_err(log_create)?;

        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .env("RBXJEST_SHARD_INDEX", request.shard.index().to_string())
            .env("RBXJEST_SHARD_COUNT", request.shard.total().to_string())
            .kill_on_drop(true);
        if let Some(filter) = &request.filter {
            command.env("RBXJEST_TEST_PATH_PATTERN", filter.as_str());
        }

        let mut child = command.spawn().map_err(|error| BackendError::Spawn {
            program: self.program.clone(),
            error,
        })?;
        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status.map_err(BackendError::Wait)?,
            Err(_) => {
                if let Err(error) = child.kill().await {
                    debug!(shard = %request.shard, %error, "failed to kill timed out process");
                }
                return Err(BackendError::Timeout {
                    timeout: self.timeout,
                });
            }
        };

        let bytes = tokio::fs::read(&request.log_path)
            .await
            .map_err(|error| BackendError::LogRead {
                path: request.log_path.clone(),
                error,
            })?;
        Ok(ExecutionOutput {
            exit_code: status.code(),
            output: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    workers: Option<usize>,
    keep_temp: bool,
}

impl TestRunnerBuilder {
    /// Sets the maximum number of concurrent executions.
    pub fn set_workers(&mut self, workers: usize) -> &mut Self {
        self.workers = Some(workers);
        self
    }

    /// Keeps the per-run output directory instead of deleting it.
    pub fn set_keep_temp(&mut self, keep_temp: bool) -> &mut Self {
        self.keep_temp = keep_temp;
        self
    }

    /// Creates a new test runner.
    pub fn build(self) -> Result<TestRunner, TestRunnerBuildError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("rbxjest-runner-worker")
            .build()
            .map_err(TestRunnerBuildError::TokioRuntimeCreate)?;

        Ok(TestRunner {
            workers: self.workers.unwrap_or(1).max(1),
            keep_temp: self.keep_temp,
            runtime,
        })
    }
}

/// Context for running a plan.
///
/// Created using [`TestRunnerBuilder::build`].
#[derive(Debug)]
pub struct TestRunner {
    workers: usize,
    keep_temp: bool,
    runtime: Runtime,
}

impl TestRunner {
    /// Returns the maximum number of concurrent executions.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Executes `plan`, returning each execution's parsed output in shard order.
    ///
    /// The first failing shard aborts the run. Processes still running at that point are killed.
    pub fn execute<B: ExecutionBackend>(
        &self,
        backend: &B,
        plan: &RunPlan,
    ) -> Result<Vec<RawRunOutput>, RunError> {
        let requests: Vec<(ShardId, Option<ShardFilter>)> = match plan {
            RunPlan::Empty => return Ok(Vec::new()),
            RunPlan::Single => vec![(ShardId::single(), None)],
            RunPlan::Fanout(shards) => shards
                .iter()
                .map(|shard| (shard.id, Some(shard.filter.clone())))
                .collect(),
        };

        let temp_dir = camino_tempfile::Builder::new()
            .prefix("rbxjest-run-")
            .tempdir()
            .map_err(RunError::TempDir)?;
        debug!(
            executions = requests.len(),
            workers = self.workers,
            dir = %temp_dir.path(),
            "starting run"
        );

        let result = self.runtime.block_on(
            futures::stream::iter(requests)
                .map(|(shard, filter)| {
                    let request = ExecutionRequest {
                        shard,
                        filter,
                        log_path: temp_dir.path().join(format!("shard-{}.log", shard.index())),
                    };
                    self.execute_shard(backend, request)
                })
                .buffered(self.workers)
                .try_collect::<Vec<_>>(),
        );

        self.finish_temp_dir(temp_dir);
        Ok(result?)
    }

    async fn execute_shard<B: ExecutionBackend>(
        &self,
        backend: &B,
        request: ExecutionRequest,
    ) -> Result<RawRunOutput, ShardExecuteError> {
        let shard = request.shard;
        let result = backend.execute(&request).await;
        if !self.keep_temp {
            remove_log(&request.log_path).await;
        }

        let ExecutionOutput { exit_code, output } =
            result.map_err(|error| ShardExecuteError::Backend { shard, error })?;
        if exit_code != Some(0) {
            return Err(ShardExecuteError::ExitCode {
                shard,
                exit_code,
                output,
            });
        }

        match parse_run_output(&output) {
            Ok(parsed) => {
                debug!(
                    %shard,
                    suites = parsed.results.test_results.len(),
                    success = parsed.success,
                    "execution finished"
                );
                Ok(parsed)
            }
            Err(error) => Err(ShardExecuteError::Parse {
                shard,
                output,
                error,
            }),
        }
    }

    fn finish_temp_dir(&self, temp_dir: Utf8TempDir) {
        if self.keep_temp {
            let path = temp_dir.keep();
            info!(dir = %path, "keeping execution logs");
        } else if let Err(error) = temp_dir.close() {
            debug!(%error, "failed to remove temporary directory");
        }
    }
}

async fn remove_log(path: &Utf8Path) {
    if let Err(error) = tokio::fs::remove_file(path).await
        && error.kind() != std::io::ErrorKind::NotFound
    {
        debug!(%path, %error, "failed to remove execution log");
    }
}
