// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use indoc::indoc;
use pretty_assertions::assert_eq;
use rbxjest_metadata::{AssertionStatus, CoverageMap, RbxJestExitCode};
use rbxjest_runner::{
    config::{RbxJestConfig, Workers},
    errors::{RunError, ShardExecuteError},
    run::TestRun,
};
use regex::Regex;
use serde_json::json;

const MATH_SOURCE: &str = indoc! {r#"
    import x from "./x";
    expect(x).toBe(2);
    describe("math", () => {
        it("adds", () => {});
    });
"#};

const MATH_COMPILED: &str = indoc! {r#"
    local x = require(script.Parent.x)
    expect(x).toBe(2)
    return nil
"#};

fn math_project() -> FixtureProject {
    FixtureProject::new(&[
        FixtureModule::new("math.spec", MATH_SOURCE, MATH_COMPILED),
        FixtureModule::new("x", "export default 2;\n", "return 2\n"),
    ])
}

fn failing_math_results() -> serde_json::Value {
    json!({
        "results": {
            "numFailedTestSuites": 1,
            "numFailedTests": 1,
            "numTotalTestSuites": 1,
            "numTotalTests": 1,
            "startTime": 1700000000000.0,
            "success": true,
            "testResults": [{
                "testFilePath": "A/B/math.spec",
                "numFailingTests": 1,
                "testResults": [{
                    "title": "adds",
                    "fullName": "math adds",
                    "ancestorTitles": ["math"],
                    "status": "failed",
                    "failureMessages": [
                        "Error at A.B.math.spec:2\n    at A.B.math.spec:2\n"
                    ],
                }],
            }],
        },
        "globalConfig": {"rootDir": "A"},
    })
}

#[test]
fn rewrites_failure_to_source() -> Result<()> {
    test_init();

    let project = math_project();
    let backend = FakeBackend::new(vec![harness_output(
        false,
        failing_math_results(),
        Some(json!({
            "total": {"lines": {"total": 3}},
            "A/B/math.spec": {"path": "A/B/math.spec", "s": {"0": 1}},
        })),
    )]);

    let outcome = TestRun::new(project.root(), &project.config).execute(&backend)?;

    let requests = backend.requests();
    assert_eq!(requests.len(), 1, "a single worker runs once");
    assert_eq!(requests[0].filter, None, "a single execution is unfiltered");

    let source = project.source("math.spec");
    let suite = &outcome.results.test_results[0];
    assert_eq!(suite.test_file_path, source.as_str());

    let message = &suite.test_results[0].failure_messages[0];
    ensure!(
        message.starts_with(&format!("Error at {source}:2:11\n")),
        "frame points at the source line: {message}"
    );
    ensure!(
        message.contains("> 2 | expect(x).toBe(2);"),
        "code frame is injected: {message}"
    );
    ensure!(!message.contains("A.B.math.spec"), "no runtime address is left: {message}");

    assert!(!outcome.results.success, "harness reported failure");
    assert_eq!(outcome.global_config, Some(json!({"rootDir": "A"})));
    assert_eq!(outcome.discovered, 1);
    assert_eq!(
        outcome.exit_code(true),
        RbxJestExitCode::TEST_RUN_FAILED
    );

    let coverage = outcome.coverage.expect("coverage was collected");
    let compiled = project.compiled("math.spec");
    let entry = coverage
        .get(compiled.as_str())
        .expect("coverage is keyed by compiled path");
    assert_eq!(
        CoverageMap::entry_path(entry),
        Some(compiled.as_str()),
        "embedded path is rewritten too"
    );
    assert!(coverage.contains_key(CoverageMap::TOTAL_KEY));

    Ok(())
}

fn passing_suite(address: &str) -> serde_json::Value {
    json!({
        "testFilePath": address,
        "numPassingTests": 1,
        "testResults": [{
            "title": "works",
            "fullName": "works",
            "status": "passed",
        }],
    })
}

#[test]
fn fans_out_across_workers() -> Result<()> {
    test_init();

    let modules: Vec<_> = (0..7)
        .map(|n| {
            FixtureModule::new(
                &format!("t{n}.spec"),
                "it(\"works\", () => {});\n",
                "it(\"works\", function() end)\n",
            )
        })
        .collect();
    let mut project = FixtureProject::new(&modules);
    project.config.run.workers = Workers::Count(3);

    let expected_sizes = [3, 3, 1];
    let mut start = 0;
    let outputs = expected_sizes
        .iter()
        .enumerate()
        .map(|(shard, &size)| {
            let suites: Vec<_> = modules[start..start + size]
                .iter()
                .map(|module| passing_suite(&module.address()))
                .collect();
            start += size;
            harness_output(
                // The last shard reports failure, which fails the whole run.
                shard != 2,
                json!({
                    "results": {
                        "numPassedTestSuites": size,
                        "numPassedTests": size,
                        "numTotalTestSuites": size,
                        "numTotalTests": size,
                        "startTime": 1000.0 * (3 - shard) as f64,
                        "success": true,
                        "testResults": suites,
                    },
                }),
                None,
            )
        })
        .collect();
    let backend = FakeBackend::new(outputs);

    let outcome = TestRun::new(project.root(), &project.config).execute(&backend)?;

    let requests = backend.requests();
    assert_eq!(requests.len(), 3);
    let mut start = 0;
    for (request, &size) in requests.iter().zip(&expected_sizes) {
        assert_eq!(request.shard.total(), 3);
        let filter = request.filter.as_ref().expect("fanned-out executions are filtered");
        let regex = Regex::new(filter.as_str())?;
        for (n, module) in modules.iter().enumerate() {
            let address = module.address();
            let slashed = address.replace('.', "/");
            let expected = (start..start + size).contains(&n);
            assert_eq!(
                regex.is_match(&address),
                expected,
                "{} filter on {address}",
                request.shard
            );
            assert_eq!(regex.is_match(&slashed), expected, "{slashed}");
        }
        start += size;
    }

    let results = &outcome.results;
    assert_eq!(results.num_passed_tests, 7);
    assert_eq!(results.num_total_test_suites, 7);
    assert_eq!(results.start_time, 1000.0, "earliest start time wins");
    assert!(!results.success);
    let paths: Vec<_> = results
        .test_results
        .iter()
        .map(|suite| suite.test_file_path.clone())
        .collect();
    let expected_paths: Vec<_> = modules
        .iter()
        .map(|module| project.source(&module.name).into_string())
        .collect();
    assert_eq!(paths, expected_paths, "suites keep shard order");
    assert!(
        results
            .test_results
            .iter()
            .flat_map(|suite| &suite.test_results)
            .all(|case| case.status == AssertionStatus::Passed)
    );

    Ok(())
}

#[test]
fn default_globs_run_each_module_once() -> Result<()> {
    test_init();

    let modules: Vec<_> = (0..4)
        .map(|n| {
            FixtureModule::new(
                &format!("t{n}.spec"),
                "it(\"works\", () => {});\n",
                "it(\"works\", function() end)\n",
            )
        })
        .collect();
    let mut project = FixtureProject::new(&modules);
    // The default globs match both src/*.spec.ts and out/*.spec.luau.
    project.config = RbxJestConfig::default_config()?;
    project.config.run.workers = Workers::Count(2);

    let outputs = modules
        .chunks(2)
        .map(|chunk| {
            let suites: Vec<_> = chunk
                .iter()
                .map(|module| passing_suite(&module.address()))
                .collect();
            harness_output(
                true,
                json!({
                    "results": {
                        "numPassedTestSuites": 2,
                        "numPassedTests": 2,
                        "numTotalTestSuites": 2,
                        "numTotalTests": 2,
                        "success": true,
                        "testResults": suites,
                    },
                }),
                None,
            )
        })
        .collect();
    let backend = FakeBackend::new(outputs);

    let outcome = TestRun::new(project.root(), &project.config).execute(&backend)?;

    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    let filters = requests
        .iter()
        .map(|request| {
            let filter = request.filter.as_ref().expect("fanned-out executions are filtered");
            Regex::new(filter.as_str())
        })
        .collect::<Result<Vec<_>, _>>()?;
    for (n, module) in modules.iter().enumerate() {
        let address = module.address();
        let selected: Vec<_> = filters
            .iter()
            .enumerate()
            .filter(|(_, regex)| regex.is_match(&address))
            .map(|(shard, _)| shard)
            .collect();
        assert_eq!(selected, [n / 2], "{address} runs in exactly one shard");
    }

    assert_eq!(outcome.discovered, 4, "one file per module");
    let results = &outcome.results;
    assert_eq!(results.num_passed_tests, 4);
    assert_eq!(results.num_total_test_suites, 4);
    assert!(results.success);
    let paths: Vec<_> = results
        .test_results
        .iter()
        .map(|suite| suite.test_file_path.clone())
        .collect();
    let expected_paths: Vec<_> = modules
        .iter()
        .map(|module| project.source(&module.name).into_string())
        .collect();
    assert_eq!(paths, expected_paths);

    Ok(())
}

#[test]
fn no_test_files_skip_execution() -> Result<()> {
    test_init();

    let project = FixtureProject::new(&[FixtureModule::new("util", "export {};\n", "return {}\n")]);
    let backend = FakeBackend::new(Vec::new());

    let outcome = TestRun::new(project.root(), &project.config).execute(&backend)?;

    assert!(backend.requests().is_empty(), "backend is never invoked");
    assert_eq!(outcome.discovered, 0);
    assert!(outcome.results.success);
    assert!(outcome.results.test_results.is_empty());
    assert_eq!(outcome.exit_code(true), RbxJestExitCode::OK);
    assert_eq!(outcome.exit_code(false), RbxJestExitCode::NO_TESTS_RUN);

    Ok(())
}

#[test]
fn no_test_files_need_no_sourcemap() -> Result<()> {
    test_init();

    let dir = camino_tempfile::Utf8TempDir::new()?;
    let config = RbxJestConfig::default_config()?;
    let backend = FakeBackend::new(Vec::new());

    let outcome = TestRun::new(dir.path(), &config).execute(&backend)?;
    assert_eq!(outcome.discovered, 0);

    Ok(())
}

#[test]
fn missing_sourcemap_is_a_setup_error() {
    test_init();

    let project = math_project();
    std::fs::remove_file(project.root().join("sourcemap.json")).expect("removed sourcemap");
    let backend = FakeBackend::new(Vec::new());

    let error = TestRun::new(project.root(), &project.config)
        .execute(&backend)
        .expect_err("sourcemap is required when tests exist");
    assert!(matches!(error, RunError::ModuleMap(_)), "{error:?}");
    assert_eq!(error.process_exit_code(), RbxJestExitCode::SETUP_ERROR);
    assert!(backend.requests().is_empty());
}

#[test]
fn nonzero_exit_fails_the_run() {
    test_init();

    let project = math_project();
    let backend = FakeBackend::with_exit_codes(vec![(
        Some(1),
        harness_output(true, failing_math_results(), None),
    )]);

    let error = TestRun::new(project.root(), &project.config)
        .execute(&backend)
        .expect_err("exit code 1 is fatal");
    assert!(
        matches!(
            error,
            RunError::Shard(ShardExecuteError::ExitCode {
                exit_code: Some(1),
                ..
            })
        ),
        "{error:?}"
    );
    assert_eq!(error.process_exit_code(), RbxJestExitCode::EXECUTION_FAILED);
}

#[test]
fn garbled_output_is_a_parse_failure() {
    test_init();

    let project = math_project();
    let backend = FakeBackend::new(vec!["the place crashed before printing anything".to_owned()]);

    let error = TestRun::new(project.root(), &project.config)
        .execute(&backend)
        .expect_err("output has no sections");
    assert!(
        matches!(error, RunError::Shard(ShardExecuteError::Parse { .. })),
        "{error:?}"
    );
    assert_eq!(error.process_exit_code(), RbxJestExitCode::OUTPUT_PARSE_FAILED);
}

#[test]
fn project_config_overrides_defaults() -> Result<()> {
    test_init();

    let project = math_project();
    write_file(
        &project.root().join(RbxJestConfig::CONFIG_PATH),
        indoc! {r#"
            [run]
            workers = 3
            timeout = "30s"

            [rewrite]
            test-location-in-results = true

            [reporters]
            enabled = ["summary", "json"]
        "#},
    );

    let config = RbxJestConfig::from_sources(project.root(), None)?;
    assert_eq!(config.run.workers, Workers::Count(3));
    assert_eq!(config.run.timeout, std::time::Duration::from_secs(30));
    assert!(config.rewrite.test_location_in_results);
    assert_eq!(config.reporters.enabled, ["summary", "json"]);
    assert_eq!(
        config.project.sourcemap, "sourcemap.json",
        "unset keys keep their defaults"
    );

    Ok(())
}
