// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to rbxjest test results.
//!
//! The types here follow the shape of Jest's `AggregatedResult` and coverage data closely enough
//! that the JSON produced by the in-runtime test harness deserializes directly into them. Fields
//! this crate does not model are preserved verbatim, so results can be handed on to reporters
//! without losing information.

mod coverage;
mod exit_codes;
mod results;

pub use coverage::*;
pub use exit_codes::*;
pub use results::*;
