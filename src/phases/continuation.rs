//! Continuation of rebases left over from an earlier run.
//!
//! When the workspace verdict is `InRebase` (a rebase is in progress and no
//! conflicts remain) nothing is fetched or rebased again. Each such repository
//! gets `git rebase --continue` with editors suppressed, and the command stops
//! there. A continuation that surfaces new conflicts is left exactly as git
//! leaves it; the next run detects and displays them.

use std::io::Write;

use log::warn;

use crate::config::Timeouts;
use crate::error::Result;
use crate::git::{GitRunner, RunOptions};
use crate::output::{self, emoji, OutputConfig};
use crate::repository::{RepositoryState, RepositoryStateInfo};

/// Outcome of `git rebase --continue` in one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationResult {
    pub repo: String,
    pub success: bool,
    /// Git's output, or why it could not run.
    pub message: String,
}

/// Continue the rebase of every repository in the `InRebase` state.
pub fn execute(
    states: &[RepositoryStateInfo],
    git: &dyn GitRunner,
    timeouts: Timeouts,
    config: &OutputConfig,
    out: &mut dyn Write,
) -> Result<Vec<ContinuationResult>> {
    let options = RunOptions::new(timeouts.rebase).non_interactive();
    let mut results = Vec::new();

    for info in states
        .iter()
        .filter(|info| info.state == RepositoryState::InRebase)
    {
        let repo = &info.repo;
        let result = match git.run(&repo.path, &["rebase", "--continue"], options) {
            Ok(output) => ContinuationResult {
                repo: repo.name.clone(),
                success: output.success,
                message: output.combined(),
            },
            Err(e) => ContinuationResult {
                repo: repo.name.clone(),
                success: false,
                message: e.to_string(),
            },
        };

        let name = output::repo_name(config, &repo.name);
        if result.success {
            writeln!(out, "{} {}: rebase continued", emoji(config, "✅", "[OK]"), name)?;
        } else {
            warn!("{}: rebase --continue failed", repo.name);
            writeln!(
                out,
                "{} {}: rebase --continue failed: {}",
                emoji(config, "❌", "[FAIL]"),
                name,
                result.message.lines().next().unwrap_or_default()
            )?;
        }
        results.push(result);
    }

    Ok(results)
}
