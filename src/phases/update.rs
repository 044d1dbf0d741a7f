//! Update pass: bring every repository up to date with its trunk branch.
//!
//! Each repository runs the same strictly sequential state machine:
//!
//! 1.  **Stash**: when `git status --porcelain` reports changes, shelve them
//!     with `git stash push --include-untracked`.
//! 2.  **Fetch**: check the remote exists, then `git fetch <remote> <trunk>`.
//! 3.  **Rebase**: `git rebase <remote>/<trunk>` with editors and pagers
//!     suppressed. On the trunk branch itself this brings local trunk forward;
//!     on any other branch it rebases the feature work.
//! 4.  **Stash pop**: restore shelved changes, unless `--no-pop-stash`.
//!
//! When fetch or rebase fails, compensation decides whether to abort the
//! rebase and whether the stash can be popped. A conflicted rebase is left in
//! place unless `--abort-on-conflict` was given, and the stash is then kept so
//! a second source of conflicts is not piled on top. Every decision lands in
//! the result's step trace and flags for the report.
//!
//! ## Concurrency
//!
//! Every unique working tree gets one worker on a dedicated rayon pool sized
//! to the worklist. Workers share nothing but a `ResultsCollector`, a single
//! lock over the result slots and the progress stream; the pass returns only
//! after every worker has written its slot. Projects mounted from the same
//! physical root are handled by one worker.

use std::fmt;
use std::io::Write;
use std::sync::Mutex;

use log::{debug, info, warn};

use crate::config::Timeouts;
use crate::error::{Error, Result};
use crate::git::{self, FetchFailure, GitRunner, RunOptions};
use crate::output::{self, emoji, OutputConfig};
use crate::repository::RepositoryInfo;

const NOTHING_TO_STASH: &str = "No local changes to save";
const NO_STASH_ENTRIES: &str = "No stash entries found";

/// Flags of the `latest` command that change the update pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Keep stashed changes shelved after a successful update.
    pub no_pop_stash: bool,
    /// Abort a rebase that stopped on conflicts instead of leaving it in place.
    pub abort_on_conflict: bool,
}

/// One step of the per-repository state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Status,
    Stash,
    RemoteCheck,
    Fetch,
    Branch,
    Rebase,
    RebaseAbort,
    StashPop,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Status => "status",
            Step::Stash => "stash",
            Step::RemoteCheck => "remote check",
            Step::Fetch => "fetch",
            Step::Branch => "branch",
            Step::Rebase => "rebase",
            Step::RebaseAbort => "rebase abort",
            Step::StashPop => "stash pop",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    Skipped,
    Failed,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepOutcome::Done => "done",
            StepOutcome::Skipped => "skipped",
            StepOutcome::Failed => "failed",
        })
    }
}

/// An entry of the step trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub step: Step,
    pub outcome: StepOutcome,
    pub detail: String,
}

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.step, self.outcome, self.detail)
    }
}

/// What went wrong in a failed update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Status,
    Stash,
    RemoteMissing,
    FetchNetwork,
    FetchPermission,
    FetchBranchNotFound,
    Fetch,
    Branch,
    Rebase,
    RebaseConflict,
    StashPop,
    StashPopConflict,
}

impl From<FetchFailure> for FailureKind {
    fn from(failure: FetchFailure) -> Self {
        match failure {
            FetchFailure::Network => FailureKind::FetchNetwork,
            FetchFailure::Permission => FailureKind::FetchPermission,
            FetchFailure::BranchNotFound => FailureKind::FetchBranchNotFound,
            FetchFailure::Other => FailureKind::Fetch,
        }
    }
}

/// The failure that ended a repository's update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepError {
    pub kind: FailureKind,
    pub message: String,
}

impl StepError {
    /// First line of the message, for one-line progress output.
    pub fn headline(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

type StepResult = std::result::Result<(), StepError>;

/// Everything that happened to one repository during the update pass.
#[derive(Debug, Clone)]
pub struct RepositoryOperationResult {
    pub repo: RepositoryInfo,
    /// Other projects mounted from the same working tree.
    pub aliases: Vec<String>,
    /// The checked-out branch was the trunk branch itself.
    pub trunk_update: bool,
    pub steps: Vec<StepRecord>,
    pub error: Option<StepError>,
    pub had_stash: bool,
    pub stash_popped: bool,
    /// `git stash pop` stopped on conflicts; the entry is still in the stash.
    pub stash_pop_conflicted: bool,
    pub rebase_attempted: bool,
    pub rebase_had_conflicts: bool,
    pub rebase_aborted: bool,
    /// A rebase was still in progress when the worker finished.
    pub rebase_left_in_progress: bool,
}

impl RepositoryOperationResult {
    pub fn new(repo: RepositoryInfo) -> Self {
        Self {
            repo,
            aliases: Vec::new(),
            trunk_update: false,
            steps: Vec::new(),
            error: None,
            had_stash: false,
            stash_popped: false,
            stash_pop_conflicted: false,
            rebase_attempted: false,
            rebase_had_conflicts: false,
            rebase_aborted: false,
            rebase_left_in_progress: false,
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    /// Repository name plus any projects sharing its working tree.
    pub fn label(&self) -> String {
        if self.aliases.is_empty() {
            self.repo.name.clone()
        } else {
            format!("{} (+{})", self.repo.name, self.aliases.join(", "))
        }
    }

    /// One-line description of a successful update.
    pub fn summary(&self) -> String {
        let upstream = self.repo.upstream();
        let mut summary = if self.trunk_update {
            format!("trunk updated from {}", upstream)
        } else {
            format!("rebased onto {}", upstream)
        };
        if self.stash_popped {
            summary.push_str(", local changes restored");
        } else if self.had_stash {
            summary.push_str(", local changes kept in stash");
        }
        summary
    }

    fn record(&mut self, step: Step, outcome: StepOutcome, detail: impl Into<String>) {
        let detail = detail.into();
        debug!("{}: {} {} ({})", self.repo.name, step, outcome, detail);
        self.steps.push(StepRecord {
            step,
            outcome,
            detail,
        });
    }

    fn fail(&mut self, step: Step, kind: FailureKind, message: impl Into<String>) -> StepError {
        let message = message.into();
        self.record(step, StepOutcome::Failed, message.clone());
        StepError { kind, message }
    }
}

/// Runs the per-repository state machine.
pub struct RepositoryUpdater<'a> {
    git: &'a dyn GitRunner,
    timeouts: Timeouts,
    options: UpdateOptions,
}

impl<'a> RepositoryUpdater<'a> {
    pub fn new(git: &'a dyn GitRunner, timeouts: Timeouts, options: UpdateOptions) -> Self {
        Self {
            git,
            timeouts,
            options,
        }
    }

    fn quick(&self) -> RunOptions {
        RunOptions::new(self.timeouts.command)
    }

    /// Update one repository. Failures are recorded in the result, never
    /// returned.
    pub fn update(&self, repo: &RepositoryInfo) -> RepositoryOperationResult {
        let mut result = RepositoryOperationResult::new(repo.clone());

        // Nothing has been changed yet if stashing fails.
        if let Err(error) = self.stash(repo, &mut result) {
            result.error = Some(error);
            return result;
        }

        match self.fetch_and_rebase(repo, &mut result) {
            Ok(()) => self.finish(repo, &mut result),
            Err(error) => {
                result.error = Some(error);
                self.compensate(repo, &mut result);
            }
        }

        result
    }

    fn stash(&self, repo: &RepositoryInfo, result: &mut RepositoryOperationResult) -> StepResult {
        let status = match self
            .git
            .run(&repo.path, &["status", "--porcelain"], self.quick())
        {
            Ok(output) if output.success => output,
            Ok(output) => {
                return Err(result.fail(Step::Status, FailureKind::Status, output.combined()))
            }
            Err(e) => return Err(result.fail(Step::Status, FailureKind::Status, e.to_string())),
        };

        if status.stdout.trim().is_empty() {
            result.record(Step::Stash, StepOutcome::Skipped, "working tree clean");
            return Ok(());
        }

        let message = format!("kira latest: auto-stash before updating {}", repo.name);
        let args = ["stash", "push", "-m", message.as_str(), "--include-untracked"];
        match self.git.run(&repo.path, &args, self.quick()) {
            Ok(output) if output.combined().contains(NOTHING_TO_STASH) => {
                result.record(Step::Stash, StepOutcome::Skipped, "no local changes to save");
                Ok(())
            }
            Ok(output) if output.success => {
                result.had_stash = true;
                result.record(Step::Stash, StepOutcome::Done, "saved local changes");
                Ok(())
            }
            Ok(output) => Err(result.fail(Step::Stash, FailureKind::Stash, output.combined())),
            Err(e) => Err(result.fail(Step::Stash, FailureKind::Stash, e.to_string())),
        }
    }

    fn fetch_and_rebase(
        &self,
        repo: &RepositoryInfo,
        result: &mut RepositoryOperationResult,
    ) -> StepResult {
        self.fetch(repo, result)?;
        self.rebase(repo, result)
    }

    fn fetch(&self, repo: &RepositoryInfo, result: &mut RepositoryOperationResult) -> StepResult {
        match git::remote_exists(self.git, &repo.path, &repo.remote, self.quick()) {
            Ok(true) => {}
            Ok(false) => {
                return Err(result.fail(
                    Step::RemoteCheck,
                    FailureKind::RemoteMissing,
                    format!("remote '{}' is not configured", repo.remote),
                ))
            }
            Err(e) => return Err(result.fail(Step::RemoteCheck, FailureKind::Fetch, e.to_string())),
        }

        let args = ["fetch", repo.remote.as_str(), repo.trunk_branch.as_str()];
        let output = match self
            .git
            .run(&repo.path, &args, RunOptions::new(self.timeouts.fetch))
        {
            Ok(output) if output.success => {
                result.record(
                    Step::Fetch,
                    StepOutcome::Done,
                    format!("fetched {}", repo.upstream()),
                );
                return Ok(());
            }
            Ok(output) => output.combined(),
            Err(e) => e.to_string(),
        };

        let failure = git::classify_fetch_failure(&output);
        Err(result.fail(
            Step::Fetch,
            failure.into(),
            format!("{}: {}", failure.describe(), output),
        ))
    }

    fn rebase(&self, repo: &RepositoryInfo, result: &mut RepositoryOperationResult) -> StepResult {
        let branch = match git::current_branch(self.git, &repo.path, self.quick()) {
            Ok(branch) => branch,
            Err(e) => return Err(result.fail(Step::Branch, FailureKind::Branch, e.to_string())),
        };

        let upstream = repo.upstream();
        result.trunk_update = branch == repo.trunk_branch;
        let action = if result.trunk_update {
            format!("trunk update of {} from {}", branch, upstream)
        } else {
            format!("rebase of {} onto {}", branch, upstream)
        };

        result.rebase_attempted = true;
        let options = RunOptions::new(self.timeouts.rebase).non_interactive();
        let rebase = self.git.run(&repo.path, &["rebase", upstream.as_str()], options);
        let (output, conflicts) = match rebase {
            Ok(output) if output.success => {
                result.record(Step::Rebase, StepOutcome::Done, action);
                return Ok(());
            }
            Ok(output) => {
                let text = output.combined();
                let conflicts = git::mentions_conflict(&text);
                (text, conflicts)
            }
            Err(e) => (e.to_string(), false),
        };

        result.rebase_had_conflicts = conflicts;
        let kind = if conflicts {
            FailureKind::RebaseConflict
        } else {
            FailureKind::Rebase
        };
        Err(result.fail(Step::Rebase, kind, format!("{} failed: {}", action, output)))
    }

    fn finish(&self, repo: &RepositoryInfo, result: &mut RepositoryOperationResult) {
        if !result.had_stash {
            return;
        }
        if self.options.no_pop_stash {
            result.record(
                Step::StashPop,
                StepOutcome::Skipped,
                "changes kept in stash (--no-pop-stash)",
            );
            return;
        }
        if let Err(error) = self.pop_stash(repo, result) {
            result.error = Some(error);
        }
    }

    fn pop_stash(
        &self,
        repo: &RepositoryInfo,
        result: &mut RepositoryOperationResult,
    ) -> StepResult {
        match self.git.run(&repo.path, &["stash", "pop"], self.quick()) {
            Ok(output) if output.success => {
                result.stash_popped = true;
                result.record(Step::StashPop, StepOutcome::Done, "restored local changes");
                Ok(())
            }
            Ok(output) if output.combined().contains(NO_STASH_ENTRIES) => {
                result.record(Step::StashPop, StepOutcome::Skipped, "no stash entries found");
                Ok(())
            }
            Ok(output) => {
                let text = output.combined();
                result.stash_pop_conflicted = git::mentions_conflict(&text);
                let kind = if result.stash_pop_conflicted {
                    FailureKind::StashPopConflict
                } else {
                    FailureKind::StashPop
                };
                Err(result.fail(Step::StashPop, kind, text))
            }
            Err(e) => Err(result.fail(Step::StashPop, FailureKind::StashPop, e.to_string())),
        }
    }

    /// Undo what can safely be undone after fetch or rebase failed.
    fn compensate(&self, repo: &RepositoryInfo, result: &mut RepositoryOperationResult) {
        if result.rebase_attempted {
            if result.rebase_had_conflicts && !self.options.abort_on_conflict {
                result.rebase_left_in_progress = true;
                result.record(
                    Step::RebaseAbort,
                    StepOutcome::Skipped,
                    "conflicted rebase left in place for resolution",
                );
            } else {
                self.abort_rebase(repo, result);
            }
        }

        if !result.had_stash {
            return;
        }
        if result.rebase_left_in_progress {
            warn!("{}: keeping stash while a rebase is in progress", repo.name);
            result.record(
                Step::StashPop,
                StepOutcome::Skipped,
                "stash kept: rebase still in progress",
            );
            return;
        }
        // The fetch or rebase failure stays the reported error.
        if let Err(error) = self.pop_stash(repo, result) {
            warn!("{}: restoring stash failed: {}", repo.name, error.headline());
        }
    }

    fn abort_rebase(&self, repo: &RepositoryInfo, result: &mut RepositoryOperationResult) {
        let git_dir = git::git_dir(self.git, &repo.path, self.quick());
        if !git::rebase_in_progress(&git_dir) {
            result.record(Step::RebaseAbort, StepOutcome::Skipped, "no rebase in progress");
            return;
        }

        warn!("{}: aborting rebase", repo.name);
        let options = self.quick().non_interactive();
        let failure = match self.git.run(&repo.path, &["rebase", "--abort"], options) {
            Ok(output) if output.success => {
                result.rebase_aborted = true;
                result.record(
                    Step::RebaseAbort,
                    StepOutcome::Done,
                    "restored the pre-rebase state",
                );
                return;
            }
            Ok(output) => output.combined(),
            Err(e) => e.to_string(),
        };

        result.rebase_left_in_progress = true;
        result.record(Step::RebaseAbort, StepOutcome::Failed, failure);
    }
}

/// Repositories sharing a working tree collapse into one unit.
#[derive(Debug)]
struct WorkUnit {
    repo: RepositoryInfo,
    aliases: Vec<String>,
}

fn work_units(repos: &[RepositoryInfo]) -> Vec<WorkUnit> {
    let mut units: Vec<WorkUnit> = Vec::new();
    for repo in repos {
        match units.iter_mut().find(|unit| unit.repo.path == repo.path) {
            Some(unit) => unit.aliases.push(repo.name.clone()),
            None => units.push(WorkUnit {
                repo: repo.clone(),
                aliases: Vec::new(),
            }),
        }
    }
    units
}

struct Collected<'w> {
    slots: Vec<Option<RepositoryOperationResult>>,
    out: &'w mut (dyn Write + Send),
}

/// Result slots plus the progress stream, behind one lock.
struct ResultsCollector<'w> {
    state: Mutex<Collected<'w>>,
    output: OutputConfig,
}

impl<'w> ResultsCollector<'w> {
    fn new(len: usize, out: &'w mut (dyn Write + Send), output: OutputConfig) -> Self {
        Self {
            state: Mutex::new(Collected {
                slots: (0..len).map(|_| None).collect(),
                out,
            }),
            output,
        }
    }

    fn record(&self, slot: usize, result: RepositoryOperationResult) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| Error::LockPoisoned {
            context: "update results".to_string(),
        })?;
        let line = progress_line(&self.output, &result);
        if let Some(entry) = state.slots.get_mut(slot) {
            *entry = Some(result);
        }
        writeln!(state.out, "{}", line)?;
        Ok(())
    }

    fn into_results(self) -> Result<Vec<RepositoryOperationResult>> {
        let state = self.state.into_inner().map_err(|_| Error::LockPoisoned {
            context: "update results".to_string(),
        })?;
        Ok(state.slots.into_iter().flatten().collect())
    }
}

fn progress_line(config: &OutputConfig, result: &RepositoryOperationResult) -> String {
    let name = output::repo_name(config, &result.label());
    match &result.error {
        None => format!("{} {}: {}", emoji(config, "✅", "[OK]"), name, result.summary()),
        Some(error) => format!(
            "{} {}: {}",
            emoji(config, "❌", "[FAIL]"),
            name,
            error.headline()
        ),
    }
}

/// Run the update pass over the worklist, one worker per working tree.
///
/// Results come back in worklist order no matter which worker finishes
/// first; progress lines are written as workers finish.
pub fn execute(
    repos: &[RepositoryInfo],
    updater: &RepositoryUpdater<'_>,
    output: OutputConfig,
    out: &mut (dyn Write + Send),
) -> Result<Vec<RepositoryOperationResult>> {
    let units = work_units(repos);
    if units.is_empty() {
        return Ok(Vec::new());
    }

    info!("updating {} working tree(s)", units.len());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(units.len())
        .thread_name(|index| format!("kira-update-{}", index))
        .build()?;

    let collector = ResultsCollector::new(units.len(), out, output);
    pool.scope(|scope| {
        for (slot, unit) in units.iter().enumerate() {
            let collector = &collector;
            scope.spawn(move |_| {
                let mut result = updater.update(&unit.repo);
                result.aliases = unit.aliases.clone();
                if let Err(e) = collector.record(slot, result) {
                    warn!("{}: could not record result: {}", unit.repo.name, e);
                }
            });
        }
    });

    collector.into_results()
}
