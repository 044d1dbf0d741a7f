//! Reporting: what happened, and exactly how to recover.
//!
//! Recovery steps are derived from a result's failure kind and flags only
//! (`had_stash`, `stash_popped`, `stash_pop_conflicted`, `rebase_aborted`,
//! `rebase_left_in_progress`), so the advice always matches what was actually
//! done to the repository. This module also renders the conflict display shown
//! when the workspace is blocked on unresolved conflicts.

use std::io::Write;

use crate::conflict::{load_repository_conflicts, ConflictRegion};
use crate::error::{Error, Result};
use crate::output::{self, emoji, heading, OutputConfig};
use crate::phases::update::{FailureKind, RepositoryOperationResult};
use crate::repository::{RepositoryState, RepositoryStateInfo};

/// Recovery instructions for a failed repository, in the order to follow them.
pub fn recovery_steps(result: &RepositoryOperationResult) -> Vec<String> {
    let Some(error) = &result.error else {
        return Vec::new();
    };
    let repo = &result.repo;
    let upstream = repo.upstream();
    let mut steps = vec![format!("cd {}", repo.path.display())];

    match error.kind {
        FailureKind::RebaseConflict | FailureKind::Rebase if result.rebase_left_in_progress => {
            if result.rebase_had_conflicts {
                steps.push("resolve the conflicts in the files listed by `git status`".to_string());
                steps.push("mark each one resolved with `git add <file>`".to_string());
                steps.push(
                    "run `git rebase --continue` (or `kira latest`, which continues it for you)"
                        .to_string(),
                );
                steps.push("to give up instead, run `git rebase --abort`".to_string());
            } else {
                steps.push("the automatic abort failed: run `git rebase --abort`".to_string());
            }
            if result.had_stash && !result.stash_popped {
                steps.push(
                    "once the rebase is finished or aborted, \
                     restore your changes with `git stash pop`"
                        .to_string(),
                );
            }
            return steps;
        }
        FailureKind::RebaseConflict | FailureKind::Rebase if result.rebase_aborted => {
            steps.push(
                "the rebase was aborted and the branch is back where it started".to_string(),
            );
            steps.push(format!(
                "rebase manually with `git rebase {}` when you are ready to resolve the conflicts",
                upstream
            ));
        }
        FailureKind::RebaseConflict | FailureKind::Rebase => {
            steps.push(format!(
                "run `git rebase {}` to see the full error",
                upstream
            ));
        }
        FailureKind::RemoteMissing => {
            steps.push(format!(
                "add the remote with `git remote add {} <url>`, \
                 or set `remote` for this project in kira.yml",
                repo.remote
            ));
        }
        FailureKind::FetchNetwork => {
            steps.push("check your network connection, then run `kira latest` again".to_string());
        }
        FailureKind::FetchPermission => {
            steps.push(format!(
                "check your credentials for remote '{}' with `git fetch {}`",
                repo.remote, repo.remote
            ));
        }
        FailureKind::FetchBranchNotFound => {
            steps.push(format!(
                "branch '{}' does not exist on '{}': set `trunk_branch` in kira.yml",
                repo.trunk_branch, repo.remote
            ));
        }
        FailureKind::Fetch => {
            steps.push(format!(
                "run `git fetch {} {}` to see the full error",
                repo.remote, repo.trunk_branch
            ));
        }
        FailureKind::Status | FailureKind::Branch => {
            steps.push("inspect the repository with `git status`".to_string());
        }
        FailureKind::Stash => {
            steps.push(
                "shelve or commit your changes yourself \
                 (`git stash push --include-untracked`), then run `kira latest` again"
                    .to_string(),
            );
        }
        FailureKind::StashPopConflict => {
            steps.extend(stash_conflict_steps());
            return steps;
        }
        FailureKind::StashPop => {
            steps.push("restore your changes with `git stash pop`".to_string());
            return steps;
        }
    }

    if result.stash_pop_conflicted {
        steps.extend(stash_conflict_steps());
    } else if result.had_stash && !result.stash_popped {
        steps.push("your changes are still stashed: restore them with `git stash pop`".to_string());
    }
    steps
}

/// `git stash pop` already applied part of the stash and left conflicts.
fn stash_conflict_steps() -> [String; 2] {
    [
        "resolve the conflicts left by `git stash pop`".to_string(),
        "the stash entry is kept: drop it with `git stash drop` once your changes are restored"
            .to_string(),
    ]
}

/// Step trace, error and recovery steps of every failed repository.
pub fn render_failures(
    results: &[RepositoryOperationResult],
    config: &OutputConfig,
    out: &mut dyn Write,
) -> Result<()> {
    let failed: Vec<_> = results.iter().filter(|r| !r.success()).collect();
    if failed.is_empty() {
        return Ok(());
    }

    writeln!(out)?;
    writeln!(out, "{}", heading(config, "Failed repositories"))?;
    for result in failed {
        writeln!(
            out,
            "{} {} ({})",
            emoji(config, "❌", "[FAIL]"),
            output::repo_name(config, &result.label()),
            result.repo.path.display()
        )?;
        writeln!(out, "   steps:")?;
        for step in &result.steps {
            writeln!(out, "     - {}", step)?;
        }
        if let Some(error) = &result.error {
            writeln!(out, "   error: {}", error.message)?;
        }
        writeln!(out, "   to recover:")?;
        for (index, step) in recovery_steps(result).iter().enumerate() {
            writeln!(out, "     {}. {}", index + 1, step)?;
        }
    }
    Ok(())
}

/// "N repositories updated, M failed".
pub fn summary_line(results: &[RepositoryOperationResult]) -> String {
    let failed = results.iter().filter(|r| !r.success()).count();
    let updated = results.len() - failed;
    format!(
        "{} repositor{} updated, {} failed",
        updated,
        if updated == 1 { "y" } else { "ies" },
        failed
    )
}

/// The terminal error for the command, if any repository failed.
pub fn check_results(results: &[RepositoryOperationResult]) -> Result<()> {
    let failed: Vec<String> = results
        .iter()
        .filter(|r| !r.success())
        .map(RepositoryOperationResult::label)
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(Error::UpdateFailed {
            failed,
            total: results.len(),
        })
    }
}

fn render_region(
    region: &ConflictRegion,
    index: usize,
    out: &mut dyn Write,
) -> std::io::Result<()> {
    writeln!(
        out,
        "    region {} (lines {}-{})",
        index + 1,
        region.start_line + 1,
        region.end_line + 1
    )?;
    let body = region
        .context_before
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(region.start_marker.as_str()))
        .chain(region.ours.lines())
        .chain(std::iter::once(region.separator_marker.as_str()))
        .chain(region.theirs.lines())
        .chain(std::iter::once(region.end_marker.as_str()))
        .chain(region.context_after.iter().map(String::as_str));
    for line in body {
        writeln!(out, "      {}", line)?;
    }
    Ok(())
}

/// Show every conflict region of every conflicted repository, followed by
/// resolution guidance.
pub fn render_conflicts(
    states: &[RepositoryStateInfo],
    config: &OutputConfig,
    out: &mut dyn Write,
) -> Result<()> {
    writeln!(out, "{}", heading(config, "Unresolved conflicts"))?;

    for info in states
        .iter()
        .filter(|info| info.state == RepositoryState::ConflictsExist)
    {
        writeln!(
            out,
            "{} {}: {}",
            emoji(config, "⚠️", "[CONFLICT]"),
            output::repo_name(config, &info.repo.name),
            info.detail
        )?;

        for file in load_repository_conflicts(info) {
            writeln!(out, "  {}", file.file_path.display())?;
            if let Some(error) = &file.error {
                writeln!(out, "    cannot show conflicts: {}", error)?;
                continue;
            }
            if file.regions.is_empty() {
                writeln!(out, "    no well-formed conflict markers found")?;
            }
            for (index, region) in file.regions.iter().enumerate() {
                render_region(region, index, out)?;
            }
        }
    }

    writeln!(out)?;
    writeln!(out, "To resolve:")?;
    writeln!(out, "  1. edit each file above and remove the conflict markers")?;
    writeln!(out, "  2. mark it resolved with {}", output::command(config, "git add <file>"))?;
    writeln!(
        out,
        "  3. finish with {} (rebase) or {} (merge)",
        output::command(config, "git rebase --continue"),
        output::command(config, "git commit")
    )?;
    writeln!(out, "  4. run {} again", output::command(config, "kira latest"))?;
    Ok(())
}

/// Guidance for repositories with a merge in progress.
pub fn render_merge_guidance(
    states: &[RepositoryStateInfo],
    config: &OutputConfig,
    out: &mut dyn Write,
) -> Result<()> {
    for info in states
        .iter()
        .filter(|info| info.state == RepositoryState::InMerge)
    {
        writeln!(
            out,
            "{} {}: merge in progress; complete it with {} or abandon with {}",
            emoji(config, "⚠️", "[MERGE]"),
            output::repo_name(config, &info.repo.name),
            output::command(config, "git commit"),
            output::command(config, "git merge --abort")
        )?;
    }
    Ok(())
}

/// Repositories whose state could not be determined.
pub fn render_detection_errors(
    states: &[RepositoryStateInfo],
    config: &OutputConfig,
    out: &mut dyn Write,
) -> Result<()> {
    for info in states
        .iter()
        .filter(|info| info.state == RepositoryState::Error)
    {
        writeln!(
            out,
            "{} {}: {} (skipped)",
            emoji(config, "❌", "[ERROR]"),
            output::repo_name(config, &info.repo.name),
            info.detail
        )?;
    }
    Ok(())
}
