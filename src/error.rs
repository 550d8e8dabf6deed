//! Error types for the build engine.
//!
//! Stage failures are not errors: a non-zero exit comes back as a
//! [`ProcessResult`](crate::process::ProcessResult) and the sequencer decides
//! what to do with it. The variants here are the cases that stop a run
//! before (or outside of) stage execution.

use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid configuration for '{field}': {message}")]
    Config { field: String, message: String },

    #[error("failed to parse configuration file {path}: {error}")]
    ConfigParse { path: PathBuf, error: String },

    #[error("invalid chromium source dir: {0}")]
    InvalidRootDir(PathBuf),

    #[error("unsupported action '{0}' (expected one of: sync, config, build, package, upload, all)")]
    UnsupportedAction(String),

    #[error("'{command}' exited with code {code}")]
    ExternalTool { command: String, code: i32 },

    #[error("failed to execute '{program}'. Is it installed? ({error})")]
    Spawn {
        program: String,
        error: std::io::Error,
    },

    #[error("preflight failed: missing {0}")]
    MissingTools(String),

    #[error("I/O error at {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl BuildError {
    /// Field-level configuration error.
    pub fn config(field: impl Into<String>, message: impl ToString) -> Self {
        Self::Config {
            field: field.into(),
            message: message.to_string(),
        }
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }
}
