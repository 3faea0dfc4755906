// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::Result;
use rbxjest_metadata::{AggregatedResult, RbxJestExitCode};
use rbxjest_runner::{
    errors::{ReporterError, RunError},
    reporter::{Reporter, ReporterCapabilities, ReporterRegistry},
    run::{RunOutcome, TestRun, report_outcome, reporter_options},
};
use serde_json::json;
use std::{cell::RefCell, io::Write, rc::Rc};

fn outcome(project: &FixtureProject) -> Result<RunOutcome> {
    let results = json!({
        "results": {
            "numFailedTestSuites": 1,
            "numPassedTestSuites": 1,
            "numTotalTestSuites": 2,
            "numFailedTests": 1,
            "numPassedTests": 1,
            "numTotalTests": 2,
            "success": true,
            "testResults": [
                {
                    "testFilePath": "A/B/a.spec",
                    "numPassingTests": 1,
                    "testResults": [{"title": "passes", "status": "passed"}],
                },
                {
                    "testFilePath": "A/B/b.spec",
                    "numFailingTests": 1,
                    "testResults": [{
                        "title": "fails",
                        "ancestorTitles": ["b"],
                        "fullName": "b fails",
                        "status": "failed",
                        "failureMessages": ["Error: nope"],
                    }],
                },
            ],
        },
    });
    let backend = FakeBackend::new(vec![harness_output(false, results, None)]);
    Ok(TestRun::new(project.root(), &project.config).execute(&backend)?)
}

fn project() -> FixtureProject {
    FixtureProject::new(&[
        FixtureModule::new("a.spec", "it(\"passes\", () => {});\n", "it(\"passes\", function() end)\n"),
        FixtureModule::new("b.spec", "it(\"fails\", () => {});\n", "it(\"fails\", function() end)\n"),
    ])
}

#[test]
fn default_reporter_prints_relative_paths() -> Result<()> {
    test_init();

    let project = project();
    let outcome = outcome(&project)?;
    let options = reporter_options(project.root(), &project.config, false);

    let mut out = Vec::new();
    report_outcome(
        &outcome,
        &ReporterRegistry::with_builtins(),
        &project.config,
        &options,
        &mut out,
    )?;
    let out = String::from_utf8(out)?;

    assert!(out.starts_with("PASS src/a.spec.ts\nFAIL src/b.spec.ts\n"), "{out}");
    assert!(out.contains("  ● b › fails\n\n    Error: nope\n"), "{out}");
    assert!(out.contains("Tests:       1 failed, 1 passed, 2 total\n"), "{out}");
    assert_eq!(outcome.exit_code(true), RbxJestExitCode::TEST_RUN_FAILED);

    Ok(())
}

#[test]
fn file_reporters_write_under_root() -> Result<()> {
    test_init();

    let mut project = project();
    project.config.reporters.enabled = vec!["json".to_owned(), "junit".to_owned()];
    project.config.reporters.json_output = Some("reports/results.json".into());
    project.config.reporters.junit_output = Some("reports/junit.xml".into());
    let outcome = outcome(&project)?;
    let options = reporter_options(project.root(), &project.config, false);

    let mut out = Vec::new();
    report_outcome(
        &outcome,
        &ReporterRegistry::with_builtins(),
        &project.config,
        &options,
        &mut out,
    )?;
    assert!(out.is_empty(), "both reporters write to files");

    let json = std::fs::read_to_string(project.root().join("reports/results.json"))?;
    let parsed: AggregatedResult = serde_json::from_str(&json)?;
    assert_eq!(parsed, outcome.results);

    let xml = std::fs::read_to_string(project.root().join("reports/junit.xml"))?;
    assert!(xml.contains(r#"name="src/b.spec.ts""#), "{xml}");
    assert!(xml.contains(r#"message="Error: nope""#), "{xml}");

    Ok(())
}

#[test]
fn unknown_reporter_is_a_setup_error() -> Result<()> {
    test_init();

    let mut project = project();
    project.config.reporters.enabled = vec!["default".to_owned(), "tap".to_owned()];
    let outcome = outcome(&project)?;
    let options = reporter_options(project.root(), &project.config, false);

    let mut out = Vec::new();
    let error = report_outcome(
        &outcome,
        &ReporterRegistry::with_builtins(),
        &project.config,
        &options,
        &mut out,
    )
    .expect_err("tap is not registered");
    assert!(matches!(error, RunError::UnknownReporter(_)), "{error:?}");
    assert_eq!(error.process_exit_code(), RbxJestExitCode::SETUP_ERROR);
    assert!(out.is_empty(), "nothing is reported");

    Ok(())
}

/// Handles only per-file start notifications.
struct StartLogger {
    seen: Rc<RefCell<Vec<String>>>,
}

impl Reporter for StartLogger {
    fn name(&self) -> &str {
        "starts"
    }

    fn capabilities(&self) -> ReporterCapabilities {
        ReporterCapabilities::TEST_START
    }

    fn on_test_start(&mut self, test_path: &str, out: &mut dyn Write) -> Result<(), ReporterError> {
        self.seen.borrow_mut().push(test_path.to_owned());
        writeln!(out, "started {test_path}").map_err(|error| ReporterError::Io {
            reporter: "starts".to_owned(),
            error,
        })
    }
}

#[test]
fn custom_reporter_gets_start_calls() -> Result<()> {
    test_init();

    let mut project = project();
    project.config.reporters.enabled = vec!["starts".to_owned()];
    let outcome = outcome(&project)?;
    let options = reporter_options(project.root(), &project.config, false);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut registry = ReporterRegistry::with_builtins();
    let shared = Rc::clone(&seen);
    registry.register("starts", move |_| {
        Box::new(StartLogger {
            seen: Rc::clone(&shared),
        })
    });

    let mut out = Vec::new();
    report_outcome(&outcome, &registry, &project.config, &options, &mut out)?;

    let expected = vec![
        project.source("a.spec").into_string(),
        project.source("b.spec").into_string(),
    ];
    assert_eq!(*seen.borrow(), expected);
    assert_eq!(
        String::from_utf8(out)?,
        format!("started {}\nstarted {}\n", expected[0], expected[1])
    );

    Ok(())
}
