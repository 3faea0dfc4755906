// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by rbxjest.

use crate::{output::OutputSection, partition::ShardId};
use camino::Utf8PathBuf;
use config::ConfigError;
use rbxjest_metadata::RbxJestExitCode;
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse rbxjest config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// Error returned while parsing a [`Workers`](crate::config::Workers) value.
#[derive(Clone, Debug, Error)]
#[error("unrecognized value for workers: {input}")]
pub struct WorkersParseError {
    input: String,
}

impl WorkersParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurred while building the module path map.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModuleMapBuildError {
    /// The sourcemap could not be read.
    #[error("failed to read sourcemap `{path}`")]
    Read {
        /// The sourcemap path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The sourcemap was not valid JSON, or did not describe an instance tree.
    #[error("failed to parse sourcemap `{path}`")]
    Parse {
        /// The sourcemap path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },
}

/// An error that occurred while discovering test files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// A glob pattern was invalid.
    #[error("invalid test file glob `{pattern}`")]
    InvalidGlob {
        /// The pattern.
        pattern: String,

        /// The underlying error.
        #[source]
        error: globset::Error,
    },

    /// The glob set could not be compiled.
    #[error("failed to compile test file globs")]
    GlobSet(#[source] globset::Error),

    /// Walking the project directory failed.
    #[error("failed to walk project directory `{root}`")]
    Walk {
        /// The directory being walked.
        root: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: walkdir::Error,
    },

    /// A path in the project was not valid UTF-8.
    #[error("path `{}` is not valid UTF-8", .path.display())]
    NonUtf8Path {
        /// The path.
        path: PathBuf,
    },
}

/// An error that occurred while parsing the output of the execution runtime.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OutputParseError {
    /// A required section was missing.
    #[error("runtime output is missing the {section} section")]
    MissingSection {
        /// The missing section.
        section: OutputSection,
    },

    /// A section was started but never ended.
    #[error("{section} section in runtime output is not terminated")]
    UnterminatedSection {
        /// The unterminated section.
        section: OutputSection,
    },

    /// The success flag was neither `true` nor `false`.
    #[error("invalid success flag in runtime output: `{value}`")]
    InvalidSuccessFlag {
        /// The value found.
        value: String,
    },

    /// A section did not contain valid JSON of the expected shape.
    #[error("failed to parse {section} section of runtime output")]
    Json {
        /// The section.
        section: OutputSection,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },
}

/// An error produced by an [`ExecutionBackend`](crate::runner::ExecutionBackend).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// The output log for a shard could not be created.
    #[error("failed to create output log `{path}`")]
    LogCreate {
        /// The log path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The output log for a shard could not be read back.
    #[error("failed to read output log `{path}`")]
    LogRead {
        /// The log path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The runtime process could not be started.
    #[error("failed to spawn `{program}`")]
    Spawn {
        /// The program that was spawned.
        program: String,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Waiting for the runtime process failed.
    #[error("failed to wait for runtime process")]
    Wait(#[source] std::io::Error),

    /// The runtime process did not finish in time.
    #[error("runtime process timed out after {}", humantime_serde::re::humantime::format_duration(*.timeout))]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// A backend-specific failure.
    #[error("{message}")]
    Other {
        /// A description of the failure.
        message: String,
    },
}

/// An error that occurred while executing a single shard.
///
/// Any shard failure aborts the whole run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ShardExecuteError {
    /// The execution backend failed.
    #[error("{shard}: execution failed")]
    Backend {
        /// The shard.
        shard: ShardId,

        /// The underlying error.
        #[source]
        error: BackendError,
    },

    /// The runtime exited with a non-zero exit code.
    #[error(
        "{shard}: runtime exited with {}, output:\n{output}",
        .exit_code.map_or_else(|| "no exit code".to_owned(), |code| format!("exit code {code}"))
    )]
    ExitCode {
        /// The shard.
        shard: ShardId,

        /// The exit code, if the process exited normally.
        exit_code: Option<i32>,

        /// The raw runtime output.
        output: String,
    },

    /// The runtime output could not be parsed.
    #[error("{shard}: failed to parse runtime output:\n{output}")]
    Parse {
        /// The shard.
        shard: ShardId,

        /// The raw runtime output.
        output: String,

        /// The underlying error.
        #[source]
        error: OutputParseError,
    },
}

/// An error that occurred while building a [`TestRunner`](crate::runner::TestRunner).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestRunnerBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),
}

/// An error returned when a reporter name is not registered.
#[derive(Clone, Debug, Error)]
#[error("unknown reporter `{name}` (known reporters: {})", .known.join(", "))]
pub struct UnknownReporterError {
    name: String,
    known: Vec<String>,
}

impl UnknownReporterError {
    pub(crate) fn new(
        name: impl Into<String>,
        known: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut known: Vec<_> = known.into_iter().map(|s| s.into()).collect();
        known.sort_unstable();
        Self {
            name: name.into(),
            known,
        }
    }

    /// Returns the name that was looked up.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// An error that occurred while a reporter was writing output.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReporterError {
    /// An error occurred while writing to the output stream.
    #[error("reporter `{reporter}` failed to write output")]
    Io {
        /// The reporter.
        reporter: String,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// An error occurred while writing a report file.
    #[error("error writing to file `{file}`")]
    Fs {
        /// The file being written.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// An error occurred while serializing results as JSON.
    #[error("error serializing results as JSON")]
    Json(#[source] serde_json::Error),

    /// An error occurred while producing JUnit XML.
    #[error("error writing JUnit output to `{file}`")]
    Junit {
        /// The output file.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: quick_junit::SerializeError,
    },
}

/// A fatal error for a whole run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    /// The module path map could not be built.
    #[error("failed to build module path map")]
    ModuleMap(#[from] ModuleMapBuildError),

    /// Test file discovery failed.
    #[error("failed to discover test files")]
    Discovery(#[from] DiscoveryError),

    /// The test runner could not be built.
    #[error("failed to build test runner")]
    RunnerBuild(#[from] TestRunnerBuildError),

    /// The temporary output directory could not be created.
    #[error("failed to create temporary output directory")]
    TempDir(#[source] std::io::Error),

    /// A shard failed.
    #[error("test execution failed")]
    Shard(#[from] ShardExecuteError),

    /// A reporter name was not registered.
    #[error(transparent)]
    UnknownReporter(#[from] UnknownReporterError),

    /// A reporter failed.
    #[error("failed to report results")]
    Reporter(#[from] ReporterError),
}

impl RunError {
    /// Returns the exit code a process should terminate with for this error.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ModuleMap(_)
            | Self::Discovery(_)
            | Self::RunnerBuild(_)
            | Self::TempDir(_)
            | Self::UnknownReporter(_) => RbxJestExitCode::SETUP_ERROR,
            Self::Shard(ShardExecuteError::Parse { .. }) => RbxJestExitCode::OUTPUT_PARSE_FAILED,
            Self::Shard(_) => RbxJestExitCode::EXECUTION_FAILED,
            Self::Reporter(_) => RbxJestExitCode::WRITE_OUTPUT_ERROR,
        }
    }
}
