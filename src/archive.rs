//! Publishing artifacts and logs to the archive server.
//!
//! Every run gets its own directory on the server:
//!
//! ```text
//! <base dir>/<label>_<target os>_<target cpu>_<SUCCEED|FAILED>/
//!     <artifact>
//!     <artifact>.sha256
//!     <log file>
//! ```
//!
//! The status suffix is read from the local marker file each time the name
//! is computed, so it reflects the state at upload time and nothing else.
//! When host, directory or ssh user is missing, every operation here is a
//! silent no-op.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::config::{ArchiveServer, Config};
use crate::error::{BuildError, BuildResult};
use crate::process::{Cmd, ProcessResult, ProcessRunner};
use crate::sink::LogSink;

/// Revision prefix length used for directory labels.
const LABEL_REVISION_LEN: usize = 10;

/// What a full upload ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Archive server not configured; nothing attempted.
    NotConfigured,
    /// The artifact is not on disk; nothing transferred.
    ArtifactMissing(PathBuf),
    Uploaded { remote_dir: String },
    Failed { command: String, code: i32 },
}

pub struct RemoteArchiver {
    server: ArchiveServer,
    target: String,
    marker: PathBuf,
    sink: Arc<dyn LogSink>,
}

impl RemoteArchiver {
    pub fn new(config: &Config, sink: Arc<dyn LogSink>) -> Self {
        Self {
            server: config.archive.clone(),
            target: format!("{}_{}", config.target_os, config.target_cpu),
            marker: config.marker_path(),
            sink,
        }
    }

    /// Host, base dir and ssh user are all set.
    pub fn is_configured(&self) -> bool {
        self.server.is_complete()
    }

    /// Per-run directory label: short revision when known, otherwise today's date.
    pub fn label(revision: Option<&str>) -> String {
        match revision {
            Some(rev) if !rev.is_empty() => rev.chars().take(LABEL_REVISION_LEN).collect(),
            _ => chrono::Local::now().format("%Y-%m-%d").to_string(),
        }
    }

    /// Remote directory for this run, or None when not configured.
    pub fn remote_dir(&self, label: &str) -> Option<String> {
        if !self.is_configured() {
            return None;
        }
        let base = self.server.dir.as_deref()?.trim_end_matches('/');
        let status = if self.marker.is_file() {
            "SUCCEED"
        } else {
            "FAILED"
        };
        Some(format!("{}/{}_{}_{}", base, label, self.target, status))
    }

    fn destination(&self) -> String {
        format!(
            "{}@{}",
            self.server.ssh_user.as_deref().unwrap_or_default(),
            self.server.host.as_deref().unwrap_or_default()
        )
    }

    /// `ssh <user>@<host> mkdir -p <dir>`
    pub async fn ensure_remote_dir<R: ProcessRunner>(
        &self,
        runner: &R,
        dir: &str,
    ) -> BuildResult<ProcessResult> {
        let cmd = Cmd::new("ssh").arg(self.destination()).args(["mkdir", "-p", dir]);
        let result = runner.run(&cmd).await?;
        if !result.success() {
            self.sink.error(&format!("failed to create remote dir {}", dir));
        }
        Ok(result)
    }

    /// `scp <path> <user>@<host>:<dir>/`
    ///
    /// Returns None without running anything if `path` is not a readable file.
    pub async fn upload_file<R: ProcessRunner>(
        &self,
        runner: &R,
        path: &Path,
        dir: &str,
    ) -> BuildResult<Option<ProcessResult>> {
        if !path.is_file() {
            self.sink.error(&format!("cannot access {}: not a file", path.display()));
            return Ok(None);
        }
        if let Err(e) = File::open(path) {
            self.sink.error(&format!("cannot access {}: {}", path.display(), e));
            return Ok(None);
        }

        self.sink.info(&format!("uploading {}", path.display()));
        let cmd = Cmd::new("scp")
            .arg_path(path)
            .arg(format!("{}:{}/", self.destination(), dir));
        let result = runner.run(&cmd).await?;
        if !result.success() {
            self.sink.error(&format!("failed to upload {}", path.display()));
        }
        Ok(Some(result))
    }

    /// Publish the packaged artifact, its checksum and the log.
    pub async fn upload_artifact<R: ProcessRunner>(
        &self,
        runner: &R,
        artifact: &Path,
        log_file: &Path,
        revision: Option<&str>,
    ) -> UploadOutcome {
        let Some(dir) = self.remote_dir(&Self::label(revision)) else {
            self.sink.debug("archive server not configured, skipping upload");
            return UploadOutcome::NotConfigured;
        };

        if !artifact.is_file() {
            self.sink.error(&format!(
                "artifact {} is not accessible, nothing uploaded",
                artifact.display()
            ));
            return UploadOutcome::ArtifactMissing(artifact.to_path_buf());
        }

        let mkdir = self.ensure_remote_dir(runner, &dir).await;
        if let Some(failed) = self.failure("ssh mkdir", mkdir.map(Some)) {
            return failed;
        }

        let upload = self.upload_file(runner, artifact, &dir).await;
        if let Some(failed) = self.failure("scp artifact", upload) {
            return failed;
        }

        match write_checksum(artifact) {
            Ok(checksum) => {
                let upload = self.upload_file(runner, &checksum, &dir).await;
                if let Some(failed) = self.failure("scp checksum", upload) {
                    return failed;
                }
            }
            Err(e) => self.sink.warn(&format!(
                "failed to write checksum for {}: {}",
                artifact.display(),
                e
            )),
        }

        // A missing log file is reported by upload_file and does not fail the upload.
        let upload = self.upload_file(runner, log_file, &dir).await;
        if let Some(failed) = self.failure("scp log", upload) {
            return failed;
        }

        self.sink.info(&format!("uploaded to {}:{}", self.destination(), dir));
        UploadOutcome::Uploaded { remote_dir: dir }
    }

    /// Best-effort upload of the log after a failed stage. Never fails.
    pub async fn upload_diagnostics<R: ProcessRunner>(
        &self,
        runner: &R,
        log_file: &Path,
        revision: Option<&str>,
    ) -> Option<String> {
        let dir = self.remote_dir(&Self::label(revision))?;
        self.sink.info(&format!("uploading build log to {}", dir));

        match self.ensure_remote_dir(runner, &dir).await {
            Ok(result) if result.success() => {}
            Ok(_) => return None,
            Err(e) => {
                self.sink.error(&e.to_string());
                return None;
            }
        }

        match self.upload_file(runner, log_file, &dir).await {
            Ok(Some(result)) if result.success() => Some(dir),
            Ok(_) => None,
            Err(e) => {
                self.sink.error(&e.to_string());
                None
            }
        }
    }

    /// Map a transfer step to a failed outcome, if it failed.
    fn failure(
        &self,
        step: &str,
        result: BuildResult<Option<ProcessResult>>,
    ) -> Option<UploadOutcome> {
        match result {
            Ok(Some(r)) if !r.success() => Some(UploadOutcome::Failed {
                command: step.to_string(),
                code: r.code,
            }),
            Ok(_) => None,
            Err(e) => {
                self.sink.error(&e.to_string());
                Some(UploadOutcome::Failed {
                    command: step.to_string(),
                    code: -1,
                })
            }
        }
    }
}

/// Write `<artifact>.sha256` next to the artifact in `sha256sum` format.
pub fn write_checksum(artifact: &Path) -> BuildResult<PathBuf> {
    let digest = sha256_file(artifact)?;
    let name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut checksum = artifact.as_os_str().to_owned();
    checksum.push(".sha256");
    let checksum = PathBuf::from(checksum);

    std::fs::write(&checksum, format!("{}  {}\n", digest, name))
        .map_err(|e| BuildError::io(&checksum, e))?;
    Ok(checksum)
}

/// Hex SHA256 of a file, streamed.
pub fn sha256_file(path: &Path) -> BuildResult<String> {
    let mut file = File::open(path).map_err(|e| BuildError::io(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| BuildError::io(path, e))?;
    Ok(format!("{:x}", hasher.finalize()))
}
