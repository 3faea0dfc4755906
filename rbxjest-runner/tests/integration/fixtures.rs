// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use rbxjest_runner::{
    config::RbxJestConfig,
    errors::BackendError,
    output::OutputSection,
    runner::{ExecutionBackend, ExecutionOutput, ExecutionRequest},
};
use serde_json::{Value, json};
use std::sync::{Mutex, Once};
use swrite::{SWrite, swrite};

pub(crate) fn test_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // Another test binary may have installed a hook already.
        _ = color_eyre::install();
        _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// The folder every fixture module lives under, as seen by the runtime.
pub(crate) const PARENT_ADDRESS: &str = "A.B";

/// A module in a fixture project: a TypeScript source and the Luau it compiles to.
pub(crate) struct FixtureModule {
    pub(crate) name: String,
    pub(crate) source: String,
    pub(crate) compiled: String,
}

impl FixtureModule {
    pub(crate) fn new(name: &str, source: &str, compiled: &str) -> Self {
        Self {
            name: name.to_owned(),
            source: source.to_owned(),
            compiled: compiled.to_owned(),
        }
    }

    pub(crate) fn address(&self) -> String {
        format!("{PARENT_ADDRESS}.{}", self.name)
    }
}

/// A project on disk with a sourcemap, sources under `src/` and compiled output under `out/`.
pub(crate) struct FixtureProject {
    dir: Utf8TempDir,
    pub(crate) config: RbxJestConfig,
}

impl FixtureProject {
    pub(crate) fn new(modules: &[FixtureModule]) -> Self {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let root = dir.path();
        for module in modules {
            write_file(&root.join(format!("src/{}.ts", module.name)), &module.source);
            write_file(
                &root.join(format!("out/{}.luau", module.name)),
                &module.compiled,
            );
        }
        write_file(&root.join("sourcemap.json"), &sourcemap(modules).to_string());

        let mut config = RbxJestConfig::default_config().expect("default config is valid");
        config.discovery.test_match = vec!["src/**/*.spec.ts".to_owned()];
        Self { dir, config }
    }

    pub(crate) fn root(&self) -> &Utf8Path {
        self.dir.path()
    }

    pub(crate) fn source(&self, name: &str) -> Utf8PathBuf {
        self.root().join(format!("src/{name}.ts"))
    }

    pub(crate) fn compiled(&self, name: &str) -> Utf8PathBuf {
        self.root().join(format!("out/{name}.luau"))
    }
}

pub(crate) fn write_file(path: &Utf8Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("created parent directory");
    }
    std::fs::write(path, contents).expect("wrote fixture file");
}

fn sourcemap(modules: &[FixtureModule]) -> Value {
    let scripts: Vec<_> = modules
        .iter()
        .map(|module| {
            json!({
                "name": module.name,
                "className": "ModuleScript",
                "filePaths": [format!("out/{}.luau", module.name)],
            })
        })
        .collect();
    json!({
        "name": "game",
        "className": "DataModel",
        "children": [{
            "name": "A",
            "className": "Folder",
            "children": [{
                "name": "B",
                "className": "Folder",
                "children": scripts,
            }],
        }],
    })
}

/// Renders the delimited output the in-runtime harness prints.
pub(crate) fn harness_output(success: bool, results: Value, coverage: Option<Value>) -> String {
    let mut sections = vec![
        (OutputSection::Success, success.to_string()),
        (OutputSection::Results, results.to_string()),
    ];
    if let Some(coverage) = coverage {
        sections.push((OutputSection::Coverage, coverage.to_string()));
    }

    let mut out = String::from("[info] place loaded\n");
    for (section, body) in sections {
        swrite!(
            out,
            "{}\n{body}\n{}\n",
            section.begin_marker(),
            section.end_marker()
        );
    }
    out
}

/// An [`ExecutionBackend`] that answers each shard with a prepared output and records every
/// request it receives.
pub(crate) struct FakeBackend {
    outputs: Vec<ExecutionOutput>,
    seen: Mutex<Vec<ExecutionRequest>>,
}

impl FakeBackend {
    /// Answers shard `i` with `outputs[i]`.
    pub(crate) fn new(outputs: Vec<String>) -> Self {
        Self::with_exit_codes(outputs.into_iter().map(|output| (Some(0), output)).collect())
    }

    pub(crate) fn with_exit_codes(outputs: Vec<(Option<i32>, String)>) -> Self {
        Self {
            outputs: outputs
                .into_iter()
                .map(|(exit_code, output)| ExecutionOutput { exit_code, output })
                .collect(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<ExecutionRequest> {
        let mut seen = self.seen.lock().expect("lock is not poisoned").clone();
        seen.sort_by_key(|request| request.shard.index());
        seen
    }
}

impl ExecutionBackend for FakeBackend {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutput, BackendError> {
        self.seen
            .lock()
            .expect("lock is not poisoned")
            .push(request.clone());
        self.outputs
            .get(request.shard.index())
            .cloned()
            .ok_or_else(|| BackendError::Other {
                message: format!("no output prepared for {}", request.shard),
            })
    }
}
