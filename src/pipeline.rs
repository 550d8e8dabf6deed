//! Stage sequencing for one pipeline run.
//!
//! The pipeline is linear: sync → configure → compile → package → upload.
//! `all` walks every stage in that order; every other action runs a single
//! stage. Each stage shells out through the [`ProcessRunner`] and reports a
//! [`StageResult`]; the sequencer alone decides whether to continue or abort.
//!
//! ```text
//! Idle ──> Running(first) ──> Running(next) ──> ... ──> Completed
//!              │                   │
//!              └───────────────────┴──> Aborted
//! ```
//!
//! A run that cannot even read the current revision goes straight from Idle
//! to Aborted. A skipped run stays Idle.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::archive::{RemoteArchiver, UploadOutcome};
use crate::changeset::{self, ChangesetTracker};
use crate::config::Config;
use crate::error::BuildError;
use crate::process::{Cmd, ProcessRunner};
use crate::sink::LogSink;
use crate::timing::Timer;

// =============================================================================
// Actions and stages
// =============================================================================

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineAction {
    Sync,
    Configure,
    Compile,
    Package,
    Upload,
    All,
}

impl PipelineAction {
    /// Command-line name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Configure => "config",
            Self::Compile => "build",
            Self::Package => "package",
            Self::Upload => "upload",
            Self::All => "all",
        }
    }

    /// Stages to run, in pipeline order.
    pub fn stages(self) -> &'static [Stage] {
        match self {
            Self::Sync => &[Stage::Sync],
            Self::Configure => &[Stage::Configure],
            Self::Compile => &[Stage::Compile],
            Self::Package => &[Stage::Package],
            Self::Upload => &[Stage::Upload],
            Self::All => &Stage::ALL,
        }
    }

    /// Sync and All always run; everything else may be skipped.
    pub fn checks_changeset(self) -> bool {
        !matches!(self, Self::Sync | Self::All)
    }
}

impl FromStr for PipelineAction {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(Self::Sync),
            "config" => Ok(Self::Configure),
            "build" => Ok(Self::Compile),
            "package" => Ok(Self::Package),
            "upload" => Ok(Self::Upload),
            "all" => Ok(Self::All),
            other => Err(BuildError::UnsupportedAction(other.to_string())),
        }
    }
}

impl fmt::Display for PipelineAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sync,
    Configure,
    Compile,
    Package,
    Upload,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Sync,
        Stage::Configure,
        Stage::Compile,
        Stage::Package,
        Stage::Upload,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Configure => "configure",
            Self::Compile => "compile",
            Self::Package => "package",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Run state
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running(Stage),
    /// `stage` is None when the run failed before its first stage.
    Aborted { stage: Option<Stage>, code: i32 },
    Completed,
}

/// How a stage ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    Done,
    Failed { command: String, code: i32 },
}

/// Terminal result of [`ActionSequencer::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub action: PipelineAction,
    pub state: PipelineState,
    /// Nothing ran because the revision was already built.
    pub skipped: bool,
    /// Remote dir that received the log after a failure.
    pub diagnostics: Option<String>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.skipped || self.state == PipelineState::Completed
    }

    /// Process exit code for the binary.
    pub fn exit_code(&self) -> u8 {
        if self.success() {
            0
        } else {
            1
        }
    }
}

// =============================================================================
// Sequencer
// =============================================================================

pub struct ActionSequencer<R: ProcessRunner> {
    config: Config,
    runner: R,
    tracker: ChangesetTracker,
    archiver: RemoteArchiver,
    sink: Arc<dyn LogSink>,
    state: PipelineState,
    revision: Option<String>,
    synced: bool,
    configured: bool,
}

impl<R: ProcessRunner> ActionSequencer<R> {
    pub fn new(config: Config, runner: R, sink: Arc<dyn LogSink>) -> Self {
        let tracker = ChangesetTracker::new(&config.root_dir, &config.marker_path(), sink.clone());
        let archiver = RemoteArchiver::new(&config, sink.clone());
        Self {
            config,
            runner,
            tracker,
            archiver,
            sink,
            state: PipelineState::Idle,
            revision: None,
            synced: false,
            configured: false,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run `action` to completion, abort, or skip.
    pub async fn run(&mut self, action: PipelineAction) -> RunOutcome {
        let revision = match self.tracker.current_revision(&self.runner).await {
            Ok(revision) => revision,
            Err(e) => {
                self.sink.error(&format!("failed to query current revision: {}", e));
                let code = match e {
                    BuildError::ExternalTool { code, .. } => code,
                    _ => -1,
                };
                return self.abort(action, None, code).await;
            }
        };
        self.revision = Some(revision.clone());

        if action.checks_changeset() {
            let last = self.tracker.last_succeeded().await;
            if changeset::should_skip(action, &revision, last.as_deref()) {
                self.sink.info(&format!(
                    "[SKIP] {}: revision {} already built",
                    action, revision
                ));
                return RunOutcome {
                    action,
                    state: self.state.clone(),
                    skipped: true,
                    diagnostics: None,
                };
            }
            // A stale marker left behind would label this run's upload as built.
            if let Err(e) = self.tracker.invalidate(&revision).await {
                self.sink.error(&format!("failed to invalidate build marker: {}", e));
                return self.abort(action, None, -1).await;
            }
        }

        for &stage in action.stages() {
            self.transition(PipelineState::Running(stage));
            self.sink.info(&format!("=== {} ===", stage));
            let timer = Timer::start(stage.name());

            match self.run_stage(stage).await {
                StageResult::Done => {
                    timer.finish(self.sink.as_ref());
                }
                StageResult::Failed { command, code } => {
                    self.sink.error(&format!(
                        "{} failed: \"{}\" exited with code {}",
                        stage, command, code
                    ));
                    return self.abort(action, Some(stage), code).await;
                }
            }
        }

        self.transition(PipelineState::Completed);
        RunOutcome {
            action,
            state: self.state.clone(),
            skipped: false,
            diagnostics: None,
        }
    }

    async fn run_stage(&mut self, stage: Stage) -> StageResult {
        match stage {
            Stage::Sync => self.sync().await,
            Stage::Configure => self.configure().await,
            Stage::Compile => self.compile().await,
            Stage::Package => self.package(),
            Stage::Upload => self.upload().await,
        }
    }

    async fn sync(&mut self) -> StageResult {
        let cmd = Cmd::new("gclient").arg("sync").dir(&self.config.root_dir);
        let result = self.exec(&cmd).await;
        if result == StageResult::Done {
            self.synced = true;
        }
        result
    }

    async fn configure(&mut self) -> StageResult {
        let cmd = Cmd::new("gn")
            .arg("gen")
            .arg(format!("--args={}", self.config.gn_args()))
            .arg_path(&self.config.out_dir)
            .dir(&self.config.root_dir);
        let result = self.exec(&cmd).await;
        if result == StageResult::Done {
            self.configured = true;
        }
        result
    }

    async fn compile(&mut self) -> StageResult {
        if !self.configured && !self.config.args_gn_path().is_file() {
            self.sink.info("output directory not generated yet, running gn first");
            if let failed @ StageResult::Failed { .. } = self.configure().await {
                return failed;
            }
        }

        // Sync moves the checkout, so the revision seen at startup is stale.
        if self.synced || self.revision.is_none() {
            match self.tracker.current_revision(&self.runner).await {
                Ok(revision) => self.revision = Some(revision),
                Err(e) => {
                    self.sink.error(&e.to_string());
                    return StageResult::Failed {
                        command: changeset::revision_query(&self.config.root_dir).to_string(),
                        code: -1,
                    };
                }
            }
        }
        let Some(revision) = self.revision.clone() else {
            return StageResult::Failed {
                command: changeset::revision_query(&self.config.root_dir).to_string(),
                code: -1,
            };
        };

        // The marker must not outlive a revision change into the compile.
        if let Err(e) = self.tracker.invalidate(&revision).await {
            self.sink.error(&e.to_string());
            return StageResult::Failed {
                command: format!("rm {}", self.tracker.marker_path().display()),
                code: -1,
            };
        }

        let cmd = Cmd::new("ninja")
            .arg("-C")
            .arg_path(&self.config.out_dir)
            .args(self.config.compile_targets())
            .dir(&self.config.root_dir);
        let result = self.exec(&cmd).await;
        if result != StageResult::Done {
            return result;
        }

        if let Err(e) = self.tracker.mark_succeeded(&revision).await {
            self.sink.error(&e.to_string());
            return StageResult::Failed {
                command: format!("write {}", self.tracker.marker_path().display()),
                code: -1,
            };
        }
        result
    }

    fn package(&self) -> StageResult {
        self.sink.info(&format!(
            "packaging is provided externally; expecting artifact at {}",
            self.config.artifact_path().display()
        ));
        StageResult::Done
    }

    async fn upload(&self) -> StageResult {
        let outcome = self
            .archiver
            .upload_artifact(
                &self.runner,
                &self.config.artifact_path(),
                &self.config.log_file,
                self.revision.as_deref(),
            )
            .await;

        match outcome {
            UploadOutcome::Failed { command, code } => StageResult::Failed { command, code },
            UploadOutcome::NotConfigured
            | UploadOutcome::ArtifactMissing(_)
            | UploadOutcome::Uploaded { .. } => StageResult::Done,
        }
    }

    /// Run one command; spawn failures count as a failed stage.
    async fn exec(&self, cmd: &Cmd) -> StageResult {
        self.sink.info(&format!("running: {}", cmd));
        match self.runner.run(cmd).await {
            Ok(result) if result.success() => StageResult::Done,
            Ok(result) => StageResult::Failed {
                command: cmd.to_string(),
                code: result.code,
            },
            Err(e) => {
                self.sink.error(&e.to_string());
                StageResult::Failed {
                    command: cmd.to_string(),
                    code: -1,
                }
            }
        }
    }

    /// Enter Aborted and push the log to the archive server if one is configured.
    async fn abort(
        &mut self,
        action: PipelineAction,
        stage: Option<Stage>,
        code: i32,
    ) -> RunOutcome {
        self.transition(PipelineState::Aborted { stage, code });
        let diagnostics = self
            .archiver
            .upload_diagnostics(&self.runner, &self.config.log_file, self.revision.as_deref())
            .await;

        RunOutcome {
            action,
            state: self.state.clone(),
            skipped: false,
            diagnostics,
        }
    }

    fn transition(&mut self, next: PipelineState) {
        self.sink.debug(&format!("state: {:?} -> {:?}", self.state, next));
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names() {
        for action in [
            PipelineAction::Sync,
            PipelineAction::Configure,
            PipelineAction::Compile,
            PipelineAction::Package,
            PipelineAction::Upload,
            PipelineAction::All,
        ] {
            assert_eq!(action.as_str().parse::<PipelineAction>().unwrap(), action);
        }
    }

    #[test]
    fn test_unknown_action() {
        let err = "deploy".parse::<PipelineAction>().unwrap_err();
        assert!(matches!(err, BuildError::UnsupportedAction(ref a) if a == "deploy"));
    }

    #[test]
    fn test_all_runs_every_stage_in_order() {
        assert_eq!(PipelineAction::All.stages(), &Stage::ALL);
        assert_eq!(PipelineAction::Compile.stages(), &[Stage::Compile]);
    }

    #[test]
    fn test_checks_changeset() {
        assert!(!PipelineAction::Sync.checks_changeset());
        assert!(!PipelineAction::All.checks_changeset());
        assert!(PipelineAction::Upload.checks_changeset());
    }

    #[test]
    fn test_exit_codes() {
        let outcome = RunOutcome {
            action: PipelineAction::Compile,
            state: PipelineState::Aborted {
                stage: Some(Stage::Compile),
                code: 1,
            },
            skipped: false,
            diagnostics: None,
        };
        assert_eq!(outcome.exit_code(), 1);

        let skipped = RunOutcome {
            state: PipelineState::Idle,
            skipped: true,
            ..outcome
        };
        assert_eq!(skipped.exit_code(), 0);
    }
}
