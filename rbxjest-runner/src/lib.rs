// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for rbxjest: running Jest test suites inside a Luau runtime and mapping the
//! results back to the project's source files.
//!
//! The basic flow of a run is:
//!
//! 1. Build a [`ModulePathMap`](module_map::ModulePathMap) from the project's Rojo sourcemap,
//!    linking runtime instance addresses to compiled and source files.
//! 2. Discover test files, and [plan](partition::RunPlan) one or more executions.
//! 3. Execute the plan through an [`ExecutionBackend`](runner::ExecutionBackend), concurrently
//!    when there are several shards.
//! 4. [Merge](aggregate) the per-shard results, then [rewrite](rewrite) every path, stack trace
//!    and coverage key so it points at source.
//! 5. Hand the results to [reporters](reporter).
//!
//! [`TestRun`](run::TestRun) drives steps 1 to 4.

pub mod aggregate;
pub mod code_frame;
pub mod config;
pub mod coverage;
pub mod discovery;
pub mod errors;
mod helpers;
pub mod locator;
pub mod module_map;
pub mod output;
pub mod partition;
pub mod reporter;
pub mod rewrite;
pub mod run;
pub mod runner;
pub mod stack;
