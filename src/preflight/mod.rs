//! Preflight checks.
//!
//! Verifies that the external tools the requested stages need are on PATH
//! before anything is spawned, so a missing depot_tools shows up as a clear
//! configuration error instead of a half-run pipeline.

mod host_tools;
mod types;

use crate::error::{BuildError, BuildResult};
use crate::pipeline::Stage;
use crate::process;
use crate::sink::LogSink;

pub use host_tools::{check_tools, required_tools};
pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Run the host tool checks for `stages`.
pub fn run_preflight(stages: &[Stage], archive_configured: bool) -> PreflightReport {
    let tools = required_tools(stages, archive_configured);
    PreflightReport {
        checks: check_tools(&tools, process::which),
    }
}

/// Run preflight and fail if any tool is missing.
pub fn run_preflight_or_fail(
    stages: &[Stage],
    archive_configured: bool,
    sink: &dyn LogSink,
) -> BuildResult<()> {
    let report = run_preflight(stages, archive_configured);
    report.log(sink);

    if !report.all_passed() {
        return Err(BuildError::MissingTools(report.failed().join(", ")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_all_action_needs_depot_tools() {
        let tools = required_tools(&Stage::ALL, true);
        let names: Vec<&str> = tools.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["git", "gclient", "gn", "ninja", "ssh", "scp"]);
    }

    #[test]
    fn test_upload_without_archive_needs_only_git() {
        let tools = required_tools(&[Stage::Upload], false);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].0, "git");
    }

    #[test]
    fn test_missing_tool_fails_report() {
        let tools = required_tools(&[Stage::Compile], false);
        let checks = check_tools(&tools, |tool| {
            (tool != "ninja").then(|| PathBuf::from(format!("/usr/bin/{}", tool)))
        });
        let report = PreflightReport { checks };

        assert!(!report.all_passed());
        assert_eq!(report.failed(), vec!["ninja"]);
    }
}
