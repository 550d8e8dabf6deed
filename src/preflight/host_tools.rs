//! Host tool availability checks.

use std::path::PathBuf;

use crate::pipeline::Stage;

use super::types::CheckResult;

/// Tools each stage shells out to, with a hint on where they come from.
pub fn required_tools(
    stages: &[Stage],
    archive_configured: bool,
) -> Vec<(&'static str, &'static str)> {
    // The revision query runs for every action.
    let mut tools = vec![("git", "Install git")];

    for stage in stages {
        let needed: &[(&'static str, &'static str)] = match stage {
            Stage::Sync => &[("gclient", "Part of depot_tools; add it to PATH")],
            Stage::Configure => &[("gn", "Part of depot_tools; add it to PATH")],
            Stage::Compile => &[
                ("gn", "Part of depot_tools; add it to PATH"),
                ("ninja", "Part of depot_tools; add it to PATH"),
            ],
            Stage::Package => &[],
            Stage::Upload if archive_configured => &[
                ("ssh", "Install an OpenSSH client"),
                ("scp", "Install an OpenSSH client"),
            ],
            Stage::Upload => &[],
        };
        for tool in needed {
            if !tools.iter().any(|(name, _)| name == &tool.0) {
                tools.push(*tool);
            }
        }
    }

    tools
}

/// Check that every tool resolves through `lookup`.
pub fn check_tools<F>(tools: &[(&str, &str)], lookup: F) -> Vec<CheckResult>
where
    F: Fn(&str) -> Option<PathBuf>,
{
    tools
        .iter()
        .map(|(tool, hint)| match lookup(tool) {
            Some(path) => CheckResult::pass_with(tool, &path.display().to_string()),
            None => CheckResult::fail(tool, &format!("Not found in PATH. {}", hint)),
        })
        .collect()
}
