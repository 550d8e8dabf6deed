//! Changeset-aware rebuild detection.
//!
//! A marker file in the output directory records the revision for which the
//! compile stage last exited 0. Actions other than `sync` and `all` are
//! skipped when the checkout is still at that revision, and the marker is
//! dropped as soon as the checkout is seen at any other revision.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{BuildError, BuildResult};
use crate::pipeline::PipelineAction;
use crate::process::{Cmd, ProcessRunner};
use crate::sink::LogSink;

pub struct ChangesetTracker {
    root_dir: PathBuf,
    marker: PathBuf,
    sink: Arc<dyn LogSink>,
}

impl ChangesetTracker {
    pub fn new(root_dir: &Path, marker: &Path, sink: Arc<dyn LogSink>) -> Self {
        Self {
            root_dir: root_dir.to_path_buf(),
            marker: marker.to_path_buf(),
            sink,
        }
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker
    }

    /// Revision currently checked out.
    pub async fn current_revision<R: ProcessRunner>(&self, runner: &R) -> BuildResult<String> {
        let cmd = revision_query(&self.root_dir);
        let result = runner.run(&cmd).await?;
        if !result.success() {
            return Err(BuildError::ExternalTool {
                command: cmd.to_string(),
                code: result.code,
            });
        }

        match result.captured.map(|s| s.trim().to_string()) {
            Some(revision) if !revision.is_empty() => {
                self.sink.debug(&format!("current revision: {}", revision));
                Ok(revision)
            }
            _ => Err(BuildError::ExternalTool {
                command: format!("{} (no output)", cmd),
                code: -1,
            }),
        }
    }

    /// Revision recorded by the last successful compile.
    ///
    /// Returns None if the marker doesn't exist.
    /// Logs a warning if it exists but can't be read.
    pub async fn last_succeeded(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.marker).await {
            Ok(s) => {
                let s = s.trim();
                if s.is_empty() {
                    None
                } else {
                    Some(s.to_string())
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                self.sink.warn(&format!(
                    "failed to read marker {}: {} (treating as no prior build)",
                    self.marker.display(),
                    e
                ));
                None
            }
        }
    }

    /// Record `revision` as fully compiled.
    pub async fn mark_succeeded(&self, revision: &str) -> BuildResult<()> {
        if let Some(parent) = self.marker.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BuildError::io(parent, e))?;
        }
        tokio::fs::write(&self.marker, revision)
            .await
            .map_err(|e| BuildError::io(&self.marker, e))?;
        self.sink.debug(&format!("marked {} as succeeded", revision));
        Ok(())
    }

    /// Drop the marker unless it names `current`.
    ///
    /// An empty or unreadable marker is dropped too. Returns true if
    /// something was removed.
    pub async fn invalidate(&self, current: &str) -> BuildResult<bool> {
        let last = self.last_succeeded().await;
        if last.as_deref() == Some(current) {
            return Ok(false);
        }

        match tokio::fs::remove_file(&self.marker).await {
            Ok(()) => {
                match last {
                    Some(last) => self.sink.info(&format!(
                        "revision changed {} -> {}, invalidated last build marker",
                        last, current
                    )),
                    None => self.sink.info("removed unusable build marker"),
                }
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BuildError::io(&self.marker, e)),
        }
    }
}

/// `git rev-parse HEAD` in the checkout, capturing the hash.
pub fn revision_query(root_dir: &Path) -> Cmd {
    Cmd::new("git")
        .args(["rev-parse", "HEAD"])
        .dir(root_dir)
        .capture_first_line()
}

/// True iff `action` checks the changeset and nothing changed since the last
/// successful compile.
pub fn should_skip(action: PipelineAction, current: &str, last_succeeded: Option<&str>) -> bool {
    action.checks_changeset() && last_succeeded == Some(current)
}
