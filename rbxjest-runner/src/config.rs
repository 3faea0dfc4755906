// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for rbxjest.
//!
//! Configuration is layered: the defaults embedded in this crate come first, followed by the
//! project's config file. Later layers override earlier ones key by key.

use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind, WorkersParseError},
    rewrite::RewriteOptions,
    stack::InternalFramePatterns,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{cmp::Ordering, fmt, str::FromStr, sync::LazyLock, time::Duration};
use tracing::warn;

/// Overall configuration for rbxjest.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RbxJestConfig {
    /// Where the project's sources, compiled output and sourcemap live.
    pub project: ProjectConfig,

    /// Which files are tests.
    pub discovery: DiscoveryConfig,

    /// How the runtime is invoked.
    pub run: RunConfig,

    /// How results are mapped back to source.
    pub rewrite: RewriteConfig,

    /// Which reporters run.
    pub reporters: ReportersConfig,
}

impl RbxJestConfig {
    /// The default location of the config within the project root.
    pub const CONFIG_PATH: &'static str = ".config/rbxjest.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config for the project at `project_root`.
    ///
    /// If `file` is given it must exist. Otherwise [`CONFIG_PATH`](Self::CONFIG_PATH) under the
    /// project root is read if present.
    pub fn from_sources(
        project_root: &Utf8Path,
        file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = project_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(config_file, kind))
    }

    /// Returns the embedded default config, without any project overrides.
    pub fn default_config() -> Result<Self, ConfigParseError> {
        Self::build_and_deserialize_config(&Self::make_default_config())
            .map_err(|kind| ConfigParseError::new("<default config>", kind))
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<Self, ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        serde_path_to_error::deserialize(config).map_err(|error| {
            // The config crate may also report the key. Keep only serde_path_to_error's path.
            let path = error.path().clone();
            let error = match error.into_inner() {
                ConfigError::At { error, .. } => *error,
                other => other,
            };
            ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                path, error,
            )))
        })
    }
}

/// The `[project]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectConfig {
    /// The Rojo sourcemap, relative to the project root.
    pub sourcemap: Utf8PathBuf,

    /// The directory containing original sources, relative to the project root.
    pub source_root: Utf8PathBuf,

    /// The directory containing compiled output, relative to the project root.
    pub output_root: Utf8PathBuf,
}

/// The `[discovery]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiscoveryConfig {
    /// Globs selecting test files.
    pub test_match: Vec<String>,

    /// Globs for paths that are never test files.
    #[serde(default)]
    pub test_path_ignore: Vec<String>,
}

/// The `[run]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    /// The number of workers.
    pub workers: Workers,

    /// The timeout for each runtime invocation.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Whether to keep per-worker output logs after the run.
    pub keep_temp: bool,

    /// Whether a run with no test files succeeds.
    pub pass_with_no_tests: bool,

    /// The command line, with `{script}` and `{target}` placeholders.
    pub command: Vec<String>,

    /// The harness script, relative to the project root.
    pub script: Utf8PathBuf,

    /// The run target, relative to the project root.
    pub target: Utf8PathBuf,
}

/// The `[rewrite]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RewriteConfig {
    /// Lines of context on either side of a code frame's target line.
    pub code_frame_context: usize,

    /// Whether to locate test declarations.
    pub test_location_in_results: bool,

    /// Whether to remove internal stack frames.
    pub strip_internal_frames: bool,

    /// Extra substrings marking a frame as internal.
    #[serde(default)]
    pub internal_frame_patterns: Vec<String>,
}

impl RewriteConfig {
    /// Converts this section into options for a [`ResultRewriter`](crate::rewrite::ResultRewriter).
    pub fn to_options(&self, colorize: bool) -> RewriteOptions {
        RewriteOptions {
            code_frame_context: self.code_frame_context,
            test_location_in_results: self.test_location_in_results,
            strip_internal_frames: self.strip_internal_frames,
            internal_frame_patterns: InternalFramePatterns::default()
                .with_patterns(self.internal_frame_patterns.iter().cloned()),
            colorize,
        }
    }
}

/// The `[reporters]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportersConfig {
    /// Reporter names, in the order they run.
    pub enabled: Vec<String>,

    /// Where the `json` reporter writes. Standard output if unset.
    #[serde(default)]
    pub json_output: Option<Utf8PathBuf>,

    /// Where the `junit` reporter writes, relative to the project root.
    #[serde(default)]
    pub junit_output: Option<Utf8PathBuf>,
}

/// Returns the number of logical CPUs.
pub fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}

/// The number of workers a run is split across.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Workers {
    /// A fixed number of workers.
    Count(usize),

    /// One worker per logical CPU.
    NumCpus,
}

impl Workers {
    /// Returns the number of workers to use.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(workers) => workers,
            Self::NumCpus => get_num_cpus(),
        }
    }

    fn from_signed(n: i64) -> Option<Self> {
        match n.cmp(&0) {
            Ordering::Greater => Some(Self::Count(n as usize)),
            Ordering::Less => Some(Self::Count((get_num_cpus() as i64 + n).max(1) as usize)),
            Ordering::Equal => None,
        }
    }
}

impl FromStr for Workers {
    type Err = WorkersParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "num-cpus" {
            return Ok(Self::NumCpus);
        }
        s.parse::<i64>()
            .ok()
            .and_then(Self::from_signed)
            .ok_or_else(|| WorkersParseError::new(s))
    }
}

impl fmt::Display for Workers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(workers) => write!(f, "{workers}"),
            Self::NumCpus => write!(f, "num-cpus"),
        }
    }
}

impl<'de> Deserialize<'de> for Workers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = Workers;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a non-zero integer or the string \"num-cpus\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse()
                    .map_err(|_| E::invalid_value(serde::de::Unexpected::Str(v), &self))
            }

            // TOML integers are signed.
            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Workers::from_signed(v)
                    .ok_or_else(|| E::invalid_value(serde::de::Unexpected::Signed(v), &self))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v {
                    0 => Err(E::invalid_value(serde::de::Unexpected::Unsigned(v), &self)),
                    v => Ok(Workers::Count(v as usize)),
                }
            }
        }

        deserializer.deserialize_any(V)
    }
}
