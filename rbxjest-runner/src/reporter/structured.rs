// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Machine-readable output.

use super::{Reporter, ReporterCapabilities, ReporterOptions, io_error};
use crate::errors::ReporterError;
use camino::Utf8PathBuf;
use rbxjest_metadata::AggregatedResult;
use serde_json::Value;
use std::io::Write;

/// Writes the rewritten results as a single JSON document, in the shape of Jest's `--json`
/// output.
#[derive(Debug)]
pub struct JsonReporter {
    output: Option<Utf8PathBuf>,
}

impl JsonReporter {
    /// The registered name.
    pub const NAME: &'static str = "json";

    /// Creates a new reporter writing to `json_output`, or to the output stream if unset.
    pub fn new(options: &ReporterOptions) -> Self {
        Self {
            output: options.json_output.as_deref().map(|path| options.resolve(path)),
        }
    }
}

impl Reporter for JsonReporter {
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
        let json = serde_json::to_string(results).map_err(ReporterError::Json)?;
        match &self.output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|error| ReporterError::Fs {
                        file: parent.to_owned(),
                        error,
                    })?;
                }
                std::fs::write(path, json).map_err(|error| ReporterError::Fs {
                    file: path.clone(),
                    error,
                })
            }
            None => writeln!(out, "{json}").map_err(io_error(Self::NAME)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use rbxjest_metadata::TestFileResult;

    fn results() -> AggregatedResult {
        AggregatedResult {
            num_total_test_suites: 1,
            test_results: vec![TestFileResult {
                test_file_path: "/p/src/a.spec.ts".to_owned(),
                ..Default::default()
            }],
            ..AggregatedResult::empty_success()
        }
    }

    #[test]
    fn writes_to_stream() {
        let mut reporter = JsonReporter::new(&ReporterOptions::default());
        let mut out = Vec::new();
        reporter.on_run_complete(&results(), None, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with('\n'));
        let parsed: AggregatedResult = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, results());
    }

    #[test]
    fn writes_to_file_under_root() {
        let dir = Utf8TempDir::new().unwrap();
        let options = ReporterOptions {
            project_root: dir.path().to_owned(),
            json_output: Some("reports/results.json".into()),
            ..Default::default()
        };
        let mut reporter = JsonReporter::new(&options);
        let mut out = Vec::new();
        reporter.on_run_complete(&results(), None, &mut out).unwrap();

        assert!(out.is_empty());
        let written = std::fs::read_to_string(dir.path().join("reports/results.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed["numTotalTestSuites"], 1);
        assert_eq!(parsed["testResults"][0]["testFilePath"], "/p/src/a.spec.ts");
    }
}
