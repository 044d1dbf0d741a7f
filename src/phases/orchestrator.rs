//! Orchestrator for the complete `latest` operation
//!
//! This module strings the phases together:
//!
//! 1. Discover the repositories of the current work item
//! 2. Detect each repository's state, sequentially and in order
//! 3. Aggregate the states into one verdict
//! 4. Act on the verdict:
//!    - conflicts: display them and stop
//!    - leftover rebase: continue it and stop
//!    - merge in progress: explain how to finish it and stop
//!    - otherwise: order the worklist, run the update pass, report
//!
//! Every stop that leaves work for the user returns an error, so the binary
//! exits non-zero.

use std::io::Write;
use std::path::Path;

use log::info;

use super::{aggregate, continuation, detection, discovery, ordering, report, update};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::git::GitRunner;
use crate::output::{self, emoji, heading, OutputConfig};
use crate::phases::update::{RepositoryOperationResult, RepositoryUpdater, UpdateOptions};
use crate::repository::{RepositoryInfo, RepositoryState, RepositoryStateInfo};

/// Run `kira latest` from the directory holding `kira.yml`.
///
/// Returns the update results when the update pass ran and every repository
/// succeeded; an empty list when a leftover rebase was continued instead.
pub fn execute_latest(
    config: &Config,
    config_dir: &Path,
    git: &dyn GitRunner,
    options: UpdateOptions,
    output: OutputConfig,
    out: &mut (dyn Write + Send),
) -> Result<Vec<RepositoryOperationResult>> {
    let timeouts = config.timeouts();

    // Phase 1: Discovery
    let found = discovery::execute(config, config_dir, git)?;
    writeln!(
        out,
        "{} work item {}: {} repositor{}",
        emoji(&output, "🔍", "[SCAN]"),
        found.work_item.id,
        found.repos.len(),
        if found.repos.len() == 1 { "y" } else { "ies" }
    )?;

    // Phase 2: State detection
    let states = detection::StateDetector::new(git, timeouts).detect_all(&found.repos);
    for info in &states {
        writeln!(
            out,
            "   {}: {} ({})",
            output::repo_name(&output, &info.repo.name),
            info.state,
            info.detail
        )?;
    }

    // Phase 3: Aggregation
    let verdict = aggregate::aggregate(&states);
    info!("workspace state: {}", verdict.overall);
    writeln!(out)?;

    match verdict.overall {
        RepositoryState::ConflictsExist => {
            report::render_conflicts(&states, &output, out)?;
            return Err(Error::Blocked {
                state: "unresolved conflicts".to_string(),
                repos: verdict.conflicting,
            });
        }
        RepositoryState::InRebase => {
            writeln!(out, "{}", heading(&output, "Continuing rebase in progress"))?;
            let results = continuation::execute(&states, git, timeouts, &output, out)?;
            let failed: Vec<String> = results
                .into_iter()
                .filter(|r| !r.success)
                .map(|r| r.repo)
                .collect();
            if !failed.is_empty() {
                return Err(Error::Blocked {
                    state: "rebase --continue failed".to_string(),
                    repos: failed,
                });
            }

            // Siblings that were not continued still block a clean exit.
            let merging = names_in_state(&states, RepositoryState::InMerge);
            if !merging.is_empty() {
                report::render_merge_guidance(&states, &output, out)?;
                return Err(Error::Blocked {
                    state: "merge in progress".to_string(),
                    repos: merging,
                });
            }
            if !verdict.errors.is_empty() {
                report::render_detection_errors(&states, &output, out)?;
                return Err(Error::Blocked {
                    state: "state check failed".to_string(),
                    repos: verdict.errors,
                });
            }

            writeln!(out, "Run `kira latest` again to finish updating.")?;
            return Ok(Vec::new());
        }
        RepositoryState::InMerge => {
            report::render_merge_guidance(&states, &output, out)?;
            return Err(Error::Blocked {
                state: "merge in progress".to_string(),
                repos: verdict.in_operation,
            });
        }
        RepositoryState::DirtyWorkingDirectory
        | RepositoryState::Error
        | RepositoryState::ReadyForUpdate => {}
    }

    report::render_detection_errors(&states, &output, out)?;

    // Phase 4: Ordering
    let updatable: Vec<RepositoryInfo> = states
        .iter()
        .filter(|info| info.state.is_updatable())
        .map(|info| info.repo.clone())
        .collect();
    let worklist = ordering::execute(&updatable);

    // Phase 5: Update
    writeln!(out, "{}", heading(&output, "Updating"))?;
    let updater = RepositoryUpdater::new(git, timeouts, options);
    let results = update::execute(&worklist, &updater, output, out)?;

    // Phase 6: Report
    report::render_failures(&results, &output, out)?;
    writeln!(out)?;
    writeln!(out, "{}", report::summary_line(&results))?;

    report::check_results(&results)?;
    if !verdict.errors.is_empty() {
        return Err(Error::Blocked {
            state: "state check failed".to_string(),
            repos: verdict.errors,
        });
    }

    Ok(results)
}

fn names_in_state(states: &[RepositoryStateInfo], state: RepositoryState) -> Vec<String> {
    states
        .iter()
        .filter(|info| info.state == state)
        .map(|info| info.repo.name.clone())
        .collect()
}
