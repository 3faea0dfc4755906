// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for rbxjest failures.
///
/// Test runs may fail for a variety of reasons. This structure documents the exit codes that may
/// occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum RbxJestExitCode {}

impl RbxJestExitCode {
    /// No errors occurred and every test passed.
    pub const OK: i32 = 0;

    /// No test files were discovered, and running without tests was not allowed.
    pub const NO_TESTS_RUN: i32 = 4;

    /// A user issue happened while setting up the run (bad config, unreadable sourcemap, invalid
    /// glob patterns).
    pub const SETUP_ERROR: i32 = 96;

    /// One or more tests failed.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// The execution runtime could not be started, timed out, or exited with a non-zero code.
    pub const EXECUTION_FAILED: i32 = 101;

    /// The execution runtime's output could not be parsed.
    pub const OUTPUT_PARSE_FAILED: i32 = 102;

    /// Writing reporter output produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
