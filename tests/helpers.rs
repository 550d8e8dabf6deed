//! Shared test utilities for build-chromium tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use build_chromium::config::{validate_root_dir, Config, ConfigFile, Overrides};
use build_chromium::process::{Cmd, ProcessResult, ProcessRunner};
use build_chromium::BuildResult;
use tempfile::TempDir;

/// Revision the scripted `git rev-parse HEAD` reports unless told otherwise.
pub const REVISION: &str = "4f1c2e9a7b3d5e6f8091a2b3c4d5e6f708192a3b";

/// Fake chromium checkout in a temporary directory.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Checkout root (contains chrome/VERSION)
    pub root: PathBuf,
    /// Log file the run writes and uploads
    pub log_file: PathBuf,
}

impl TestEnv {
    /// Create a new test environment with a valid source root and log file.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join("src");
        fs::create_dir_all(root.join("chrome")).expect("Failed to create chrome dir");
        fs::write(root.join("chrome/VERSION"), "MAJOR=120\nMINOR=0\n")
            .expect("Failed to create VERSION");

        let log_file = temp_dir.path().join("build.log");
        fs::write(&log_file, "build log\n").expect("Failed to create log file");

        Self {
            root: validate_root_dir(&root).expect("root should validate"),
            log_file,
            _temp_dir: temp_dir,
        }
    }

    /// Resolve `json` as the configuration file, pointing logging at this env.
    pub fn config(&self, json: &str) -> Config {
        let mut file =
            ConfigFile::parse(json, Path::new("test.conf")).expect("test config should parse");
        file.logging.file = Some(self.log_file.clone());
        Config::resolve(self.root.clone(), file, Overrides::default())
            .expect("test config should resolve")
    }

    /// linux/x64/release without an archive server.
    pub fn linux_config(&self) -> Config {
        self.config(r#"{"target-os": "linux", "target-cpu": "x64", "gnArgs": {"is-debug": false}}"#)
    }

    /// linux/x64/release with a complete archive server.
    pub fn archived_config(&self) -> Config {
        self.config(
            r#"{
                "target-os": "linux",
                "target-cpu": "x64",
                "gnArgs": {"is-debug": false},
                "archive-server": {"host": "archive.example.com", "dir": "/srv/builds", "ssh-user": "builder"}
            }"#,
        )
    }
}

/// Write the changeset marker for `config`.
pub fn write_marker(config: &Config, revision: &str) {
    fs::create_dir_all(&config.out_dir).expect("Failed to create out dir");
    fs::write(config.marker_path(), revision).expect("Failed to write marker");
}

/// Pretend `gn gen` already ran for `config`.
pub fn write_args_gn(config: &Config) {
    fs::create_dir_all(&config.out_dir).expect("Failed to create out dir");
    fs::write(config.args_gn_path(), "is_debug = false\n").expect("Failed to write args.gn");
}

/// Create the packaged artifact for `config`.
pub fn write_artifact(config: &Config) -> PathBuf {
    let artifact = config.artifact_path();
    fs::create_dir_all(artifact.parent().unwrap()).expect("Failed to create artifact dir");
    fs::write(&artifact, b"zip bytes").expect("Failed to write artifact");
    artifact
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub cmd: Cmd,
    /// Whether the marker file existed when the command was spawned.
    pub marker_present: bool,
}

/// ProcessRunner that records every command and answers from a script.
///
/// Unscripted commands exit 0. `git` answers with [`REVISION`]. A successful
/// `gn gen` writes `args.gn` into the output dir like the real tool.
pub struct ScriptedRunner {
    marker: PathBuf,
    calls: RefCell<Vec<Call>>,
    responses: RefCell<HashMap<String, VecDeque<ProcessResult>>>,
}

impl ScriptedRunner {
    pub fn new(config: &Config) -> Self {
        Self {
            marker: config.marker_path(),
            calls: RefCell::new(Vec::new()),
            responses: RefCell::new(HashMap::new()),
        }
    }

    /// Queue the next result for `program`.
    pub fn respond(self, program: &str, result: ProcessResult) -> Self {
        self.responses
            .borrow_mut()
            .entry(program.to_string())
            .or_default()
            .push_back(result);
        self
    }

    /// Queue a revision for the next `git rev-parse HEAD`.
    pub fn revision(self, revision: &str) -> Self {
        self.respond("git", ProcessResult::with_capture(0, revision))
    }

    /// Queue a failing exit for the next run of `program`.
    pub fn fail(self, program: &str, code: i32) -> Self {
        self.respond(program, ProcessResult::exited(code))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Program names in invocation order.
    pub fn programs(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|c| c.cmd.program().to_string())
            .collect()
    }

    /// Recorded invocations of `program`.
    pub fn calls_to(&self, program: &str) -> Vec<Call> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.cmd.program() == program)
            .cloned()
            .collect()
    }
}

impl ProcessRunner for ScriptedRunner {
    async fn run(&self, cmd: &Cmd) -> BuildResult<ProcessResult> {
        self.calls.borrow_mut().push(Call {
            cmd: cmd.clone(),
            marker_present: self.marker.is_file(),
        });

        let scripted = self
            .responses
            .borrow_mut()
            .get_mut(cmd.program())
            .and_then(|queue| queue.pop_front());
        let result = match scripted {
            Some(result) => result,
            None if cmd.program() == "git" => ProcessResult::with_capture(0, REVISION),
            None => ProcessResult::exited(0),
        };

        if cmd.program() == "gn" && result.success() {
            if let Some(out_dir) = cmd.get_args().last() {
                fs::create_dir_all(out_dir).expect("Failed to create out dir");
                fs::write(Path::new(out_dir).join("args.gn"), "").expect("Failed to write args.gn");
            }
        }

        Ok(result)
    }
}

/// Assert that a file contains exactly `expected`.
pub fn assert_file_is(path: &Path, expected: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read file {}: {}", path.display(), e));
    assert_eq!(content, expected, "unexpected content in {}", path.display());
}
