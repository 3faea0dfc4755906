// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing the delimited output blob printed by the in-runtime harness.
//!
//! The harness prints up to three sections, each wrapped in marker lines:
//!
//! ```text
//! -----BEGIN RBXJEST SUCCESS-----
//! true
//! -----END RBXJEST SUCCESS-----
//! -----BEGIN RBXJEST RESULTS-----
//! {"results": {...}, "globalConfig": {...}}
//! -----END RBXJEST RESULTS-----
//! -----BEGIN RBXJEST COVERAGE-----
//! {...}
//! -----END RBXJEST COVERAGE-----
//! ```
//!
//! The coverage section is optional. Anything outside the sections is runtime log noise.

use crate::errors::OutputParseError;
use rbxjest_metadata::{AggregatedResult, CoverageMap};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// A section of the harness output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputSection {
    /// The overall success flag.
    Success,

    /// The aggregated results and global config.
    Results,

    /// Coverage data.
    Coverage,
}

impl OutputSection {
    fn tag(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Results => "RESULTS",
            Self::Coverage => "COVERAGE",
        }
    }

    /// Returns the line that opens this section.
    pub fn begin_marker(self) -> String {
        format!("-----BEGIN RBXJEST {}-----", self.tag())
    }

    /// Returns the line that closes this section.
    pub fn end_marker(self) -> String {
        format!("-----END RBXJEST {}-----", self.tag())
    }
}

impl fmt::Display for OutputSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Results => write!(f, "results"),
            Self::Coverage => write!(f, "coverage"),
        }
    }
}

/// The parsed output of a single execution.
#[derive(Clone, Debug, PartialEq)]
pub struct RawRunOutput {
    /// The success flag printed by the harness.
    pub success: bool,

    /// Results, still keyed by runtime addresses. `success` is already folded into
    /// `results.success`.
    pub results: AggregatedResult,

    /// Jest's global config, if the harness reported one.
    pub global_config: Option<Value>,

    /// Coverage data, if collected.
    pub coverage: Option<CoverageMap>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultsSection {
    results: AggregatedResult,
    #[serde(default)]
    global_config: Option<Value>,
}

/// Parses the output blob of one execution.
pub fn parse_run_output(blob: &str) -> Result<RawRunOutput, OutputParseError> {
    let success = match required_section(blob, OutputSection::Success)? {
        "true" => true,
        "false" => false,
        other => {
            return Err(OutputParseError::InvalidSuccessFlag {
                value: other.to_owned(),
            });
        }
    };

    let section = required_section(blob, OutputSection::Results)?;
    let ResultsSection {
        mut results,
        global_config,
    } = serde_json::from_str(section).map_err(|error| OutputParseError::Json {
        section: OutputSection::Results,
        error,
    })?;
    results.success &= success;

    let coverage = match find_section(blob, OutputSection::Coverage)? {
        Some(section) => Some(serde_json::from_str(section).map_err(|error| {
            OutputParseError::Json {
                section: OutputSection::Coverage,
                error,
            }
        })?),
        None => None,
    };

    Ok(RawRunOutput {
        success,
        results,
        global_config: global_config.filter(|config| !config.is_null()),
        coverage,
    })
}

fn required_section(blob: &str, section: OutputSection) -> Result<&str, OutputParseError> {
    find_section(blob, section)?.ok_or(OutputParseError::MissingSection { section })
}

/// Returns the trimmed contents of the first occurrence of `section`.
fn find_section(blob: &str, section: OutputSection) -> Result<Option<&str>, OutputParseError> {
    let begin = section.begin_marker();
    let Some(start) = blob.find(&begin) else {
        return Ok(None);
    };
    let body = &blob[start + begin.len()..];
    let end = body
        .find(&section.end_marker())
        .ok_or(OutputParseError::UnterminatedSection { section })?;
    Ok(Some(body[..end].trim()))
}
