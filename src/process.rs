//! External command execution.
//!
//! Every tool the pipeline drives (gclient, git, gn, ninja, ssh, scp) goes
//! through a [`ProcessRunner`]. A non-zero exit is returned as data in
//! [`ProcessResult`]; the only error is failing to start the program at all.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::error::{BuildError, BuildResult};
use crate::sink::LogSink;

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// Exit code, or -1 if terminated by signal.
    pub code: i32,
    /// First stdout line, when the command was run with capture enabled.
    pub captured: Option<String>,
}

impl ProcessResult {
    pub fn exited(code: i32) -> Self {
        Self {
            code,
            captured: None,
        }
    }

    pub fn with_capture(code: i32, line: impl Into<String>) -> Self {
        Self {
            code,
            captured: Some(line.into()),
        }
    }

    /// Returns true if the command exited with code 0.
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Builder describing one command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    capture_first_line: bool,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            current_dir: None,
            capture_first_line: false,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set the working directory.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Record the first stdout line into [`ProcessResult::captured`].
    pub fn capture_first_line(mut self) -> Self {
        self.capture_first_line = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn captures(&self) -> bool {
        self.capture_first_line
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runs one external command to completion.
///
/// Callers await each invocation before issuing the next, so at most one
/// child process exists at a time.
#[allow(async_fn_in_trait)]
pub trait ProcessRunner {
    async fn run(&self, cmd: &Cmd) -> BuildResult<ProcessResult>;
}

/// Runs commands on the host with tokio, streaming output into a [`LogSink`].
pub struct SystemRunner {
    sink: Arc<dyn LogSink>,
}

impl SystemRunner {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

impl ProcessRunner for SystemRunner {
    async fn run(&self, cmd: &Cmd) -> BuildResult<ProcessResult> {
        self.sink.debug(&format!("running: {}", cmd));

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = cmd.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|error| BuildError::Spawn {
            program: cmd.program.clone(),
            error,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let sink = self.sink.as_ref();
        let capture = cmd.capture_first_line;

        let read_stdout = async {
            let mut first = None;
            if let Some(stdout) = stdout {
                drain_lines(stdout, |line| {
                    if capture && first.is_none() {
                        first = Some(line.to_string());
                    }
                    sink.info(line);
                })
                .await;
            }
            first
        };
        let read_stderr = async {
            if let Some(stderr) = stderr {
                drain_lines(stderr, |line| sink.error(line)).await;
            }
        };

        // Both pipes must be drained while waiting or a chatty child blocks.
        let (captured, (), status) = tokio::join!(read_stdout, read_stderr, child.wait());
        let status = status.map_err(|error| BuildError::Spawn {
            program: cmd.program.clone(),
            error,
        })?;

        let code = status.code().unwrap_or(-1);
        if code != 0 {
            self.sink.error(&format!("\"{}\" exited with code {}", cmd, code));
        }

        Ok(ProcessResult { code, captured })
    }
}

/// Feed each line of `reader` to `on_line`, lossily decoded.
async fn drain_lines<R, F>(reader: R, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                on_line(line.trim_end_matches(['\n', '\r']));
            }
        }
    }
}

/// Check if a program exists in PATH.
///
/// Returns the full path if found, None otherwise.
pub fn which(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

// =============================================================================
// Tests
// =============================================================================
