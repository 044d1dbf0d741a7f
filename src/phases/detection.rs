//! State detection: classify each repository's live git state.
//!
//! The checks run in a fixed order for every repository:
//!
//! 1.  Resolve the metadata directory with `git rev-parse --git-dir`, so
//!     linked worktrees are inspected through their own metadata.
//! 2.  A `rebase-merge` / `rebase-apply` directory means a rebase is in
//!     progress: the repository is `ConflictsExist` if conflicts remain,
//!     `InRebase` otherwise.
//! 3.  `MERGE_HEAD` means a merge is in progress, with the same conflict check
//!     (`ConflictsExist` or `InMerge`).
//! 4.  Otherwise `git status --porcelain` decides between `ConflictsExist`
//!     (unmerged status codes), `DirtyWorkingDirectory` and `ReadyForUpdate`.
//!
//! Any failure to run git turns into the `Error` state for that repository
//! alone; detection of the other repositories continues.

use log::debug;

use crate::config::Timeouts;
use crate::error::Result;
use crate::git::{self, require_success, GitRunner, RunOptions};
use crate::repository::{RepositoryInfo, RepositoryState, RepositoryStateInfo};

/// Suffix of the `git diff --check` line for a file with conflict markers.
const LEFTOVER_MARKER: &str = ": leftover conflict marker";

/// Phrases of `git status` that only appear while paths are unmerged.
const UNMERGED_STATUS_PHRASES: [&str; 5] = [
    "Unmerged paths",
    "both modified",
    "both added",
    "deleted by them",
    "deleted by us",
];

/// Porcelain codes for unmerged paths that do not contain a `U`.
const UNMERGED_CODES: [&str; 2] = ["AA", "DD"];

/// Parsed `git status --porcelain` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PorcelainStatus {
    /// Every changed path, in git's order.
    pub changed: Vec<String>,
    /// Paths with unmerged index entries.
    pub conflicted: Vec<String>,
}

impl PorcelainStatus {
    pub fn parse(output: &str) -> Self {
        let mut status = Self::default();

        for line in output.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let code = line.get(..2).unwrap_or(line);
            let path = line.get(3..).map(porcelain_path).unwrap_or_default();

            if code.contains('U') || UNMERGED_CODES.contains(&code) {
                status.conflicted.push(path.clone());
            }
            status.changed.push(path);
        }

        status
    }

    pub fn is_clean(&self) -> bool {
        self.changed.is_empty()
    }
}

fn porcelain_path(raw: &str) -> String {
    // Renames are reported as "old -> new".
    let path = raw.rsplit(" -> ").next().unwrap_or(raw);
    path.trim_matches('"').to_string()
}

/// Whether `git diff --check` output points at leftover conflict markers.
pub fn diff_check_reports_conflict(output: &str) -> bool {
    output.contains("<<<<<<<") || git::mentions_conflict(output)
}

/// Files named by `<path>:<line>: leftover conflict marker` lines, in order
/// and without repeats.
pub fn diff_check_files(output: &str) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for line in output.lines() {
        let Some(location) = line.trim_end().strip_suffix(LEFTOVER_MARKER) else {
            continue;
        };
        let Some((path, line_no)) = location.rsplit_once(':') else {
            continue;
        };
        if line_no.is_empty() || !line_no.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if !files.iter().any(|f| f == path) {
            files.push(path.to_string());
        }
    }
    files
}

/// Whether long-form `git status` output lists unmerged paths.
pub fn status_reports_unmerged(output: &str) -> bool {
    UNMERGED_STATUS_PHRASES
        .iter()
        .any(|phrase| output.contains(phrase))
}

/// Classifies repositories by inspecting their working trees.
pub struct StateDetector<'a> {
    git: &'a dyn GitRunner,
    options: RunOptions,
}

impl<'a> StateDetector<'a> {
    pub fn new(git: &'a dyn GitRunner, timeouts: Timeouts) -> Self {
        Self {
            git,
            options: RunOptions::new(timeouts.command),
        }
    }

    /// Detect the state of every repository, one after another, in order.
    pub fn detect_all(&self, repos: &[RepositoryInfo]) -> Vec<RepositoryStateInfo> {
        repos.iter().map(|repo| self.detect(repo)).collect()
    }

    /// Detect the state of one repository. Never fails: git errors become
    /// `RepositoryState::Error`.
    pub fn detect(&self, repo: &RepositoryInfo) -> RepositoryStateInfo {
        match self.try_detect(repo) {
            Ok(info) => {
                debug!("{}: {} ({})", repo.name, info.state, info.detail);
                info
            }
            Err(e) => RepositoryStateInfo::failed(repo.clone(), e.to_string()),
        }
    }

    fn try_detect(&self, repo: &RepositoryInfo) -> Result<RepositoryStateInfo> {
        let git_dir = git::git_dir(self.git, &repo.path, self.options);

        if git::rebase_in_progress(&git_dir) {
            return self.in_operation(repo, RepositoryState::InRebase, "rebase");
        }
        if git::merge_in_progress(&git_dir) {
            return self.in_operation(repo, RepositoryState::InMerge, "merge");
        }

        let args = ["status", "--porcelain"];
        let output = self.git.run(&repo.path, &args, self.options)?;
        let output = require_success(&repo.path, &args, output)?;
        let status = PorcelainStatus::parse(&output.stdout);

        let info = if !status.conflicted.is_empty() {
            RepositoryStateInfo::new(
                repo.clone(),
                RepositoryState::ConflictsExist,
                format!("unmerged files: {}", status.conflicted.join(", ")),
            )
            .with_conflicted_files(status.conflicted)
        } else if !status.is_clean() {
            RepositoryStateInfo::new(
                repo.clone(),
                RepositoryState::DirtyWorkingDirectory,
                format!("{} uncommitted change(s)", status.changed.len()),
            )
        } else {
            RepositoryStateInfo::new(
                repo.clone(),
                RepositoryState::ReadyForUpdate,
                "working tree clean",
            )
        };

        Ok(info)
    }

    fn in_operation(
        &self,
        repo: &RepositoryInfo,
        state: RepositoryState,
        operation: &str,
    ) -> Result<RepositoryStateInfo> {
        if let Some(marker_files) = self.conflict_check(repo)? {
            let mut files = git::unmerged_files(self.git, &repo.path, self.options)?;
            if files.is_empty() {
                files = marker_files;
            }
            return Ok(RepositoryStateInfo::new(
                repo.clone(),
                RepositoryState::ConflictsExist,
                format!("conflicts detected during {} operation", operation),
            )
            .with_conflicted_files(files));
        }

        Ok(RepositoryStateInfo::new(
            repo.clone(),
            state,
            format!("{} in progress, no conflicts remaining", operation),
        ))
    }

    /// `Some` with the files `git diff --check` flagged when the operation
    /// still has conflicts, `None` when it has none.
    fn conflict_check(&self, repo: &RepositoryInfo) -> Result<Option<Vec<String>>> {
        let diff = self
            .git
            .run(&repo.path, &["diff", "--check"], self.options)?;
        let diff_output = diff.combined();
        let markers_left = !diff.success && diff_check_reports_conflict(&diff_output);

        let args = ["status"];
        let status = self.git.run(&repo.path, &args, self.options)?;
        let status = require_success(&repo.path, &args, status)?;
        let unmerged = status_reports_unmerged(&status.stdout);

        if markers_left || unmerged {
            Ok(Some(diff_check_files(&diff_output)))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::GitOutput;
    use crate::repository::sample_repo;
    use crate::testing::ScriptedGit;
    use tempfile::TempDir;

    fn detector(git: &ScriptedGit) -> StateDetector<'_> {
        StateDetector::new(git, Timeouts::default())
    }

    /// A repository whose metadata directory is a real temp dir.
    fn repo_with_git_dir(git: &ScriptedGit) -> (RepositoryInfo, TempDir) {
        let git_dir = TempDir::new().unwrap();
        git.on(
            "rev-parse --git-dir",
            GitOutput::ok(format!("{}\n", git_dir.path().display())),
        );
        (sample_repo("api"), git_dir)
    }

    #[test]
    fn test_porcelain_parse() {
        let status = PorcelainStatus::parse(" M src/lib.rs\n?? notes.txt\nR  old.rs -> new.rs\n");
        assert_eq!(status.changed, vec!["src/lib.rs", "notes.txt", "new.rs"]);
        assert!(status.conflicted.is_empty());
    }

    #[test]
    fn test_porcelain_unmerged_codes() {
        let output = "UU a.txt\nAA b.txt\nDD c.txt\nAU d.txt\nUD e.txt\nM  f.txt\n";
        let status = PorcelainStatus::parse(output);
        assert_eq!(status.conflicted, vec!["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"]);
        assert_eq!(status.changed.len(), 6);
    }

    #[test]
    fn test_clean_repository_is_ready() {
        let git = ScriptedGit::new();
        git.on("status --porcelain", GitOutput::ok(""));

        let info = detector(&git).detect(&sample_repo("api"));
        assert_eq!(info.state, RepositoryState::ReadyForUpdate);
    }

    #[test]
    fn test_uncommitted_changes_are_dirty() {
        let git = ScriptedGit::new();
        git.on("status --porcelain", GitOutput::ok(" M README.md\n?? scratch.txt\n"));

        let info = detector(&git).detect(&sample_repo("api"));
        assert_eq!(info.state, RepositoryState::DirtyWorkingDirectory);
        assert_eq!(info.detail, "2 uncommitted change(s)");
    }

    #[test]
    fn test_unmerged_porcelain_lists_files() {
        let git = ScriptedGit::new();
        git.on("status --porcelain", GitOutput::ok("UU src/main.rs\n M other.rs\n"));

        let info = detector(&git).detect(&sample_repo("api"));
        assert_eq!(info.state, RepositoryState::ConflictsExist);
        assert_eq!(info.conflicted_files, vec!["src/main.rs"]);
        assert!(info.detail.contains("src/main.rs"));
    }

    #[test]
    fn test_rebase_without_conflicts_is_in_rebase() {
        let git = ScriptedGit::new();
        let (repo, git_dir) = repo_with_git_dir(&git);
        std::fs::create_dir(git_dir.path().join("rebase-merge")).unwrap();
        git.on("diff --check", GitOutput::ok(""));
        git.on(
            "status",
            GitOutput::ok(
                "interactive rebase in progress; onto 1234abc\n\
                 (all conflicts fixed: run \"git rebase --continue\")\n",
            ),
        );

        let info = detector(&git).detect(&repo);
        assert_eq!(info.state, RepositoryState::InRebase);
        assert!(!git.called("status --porcelain"));
    }

    #[test]
    fn test_rebase_with_leftover_markers_is_conflicted() {
        let git = ScriptedGit::new();
        let (repo, git_dir) = repo_with_git_dir(&git);
        std::fs::create_dir(git_dir.path().join("rebase-apply")).unwrap();
        git.on(
            "diff --check",
            GitOutput::failed("README.md:3: leftover conflict marker"),
        );
        git.on("status", GitOutput::ok("rebase in progress\n"));
        git.on("diff --name-only --diff-filter=U", GitOutput::ok("README.md\n"));

        let info = detector(&git).detect(&repo);
        assert_eq!(info.state, RepositoryState::ConflictsExist);
        assert_eq!(info.detail, "conflicts detected during rebase operation");
        assert_eq!(info.conflicted_files, vec!["README.md"]);
    }

    #[test]
    fn test_staged_markers_are_listed_from_diff_check() {
        let git = ScriptedGit::new();
        let (repo, git_dir) = repo_with_git_dir(&git);
        std::fs::create_dir(git_dir.path().join("rebase-merge")).unwrap();
        git.on(
            "diff --check",
            GitOutput::failed(
                "src/lib.rs:12: leftover conflict marker\n\
                 src/lib.rs:16: leftover conflict marker\n\
                 docs/a b.md:3: leftover conflict marker\n",
            ),
        );
        git.on("status", GitOutput::ok("rebase in progress\n"));
        git.on("diff --name-only --diff-filter=U", GitOutput::ok(""));

        let info = detector(&git).detect(&repo);
        assert_eq!(info.state, RepositoryState::ConflictsExist);
        assert_eq!(info.conflicted_files, vec!["src/lib.rs", "docs/a b.md"]);
    }

    #[test]
    fn test_diff_check_files_ignores_other_lines() {
        let output = "a.txt:1: trailing whitespace.\n\
                      +foo \n\
                      b.txt:7: leftover conflict marker\n\
                      weird: leftover conflict marker\n";
        assert_eq!(diff_check_files(output), vec!["b.txt"]);
    }

    #[test]
    fn test_rebase_with_unmerged_status_is_conflicted() {
        let git = ScriptedGit::new();
        let (repo, git_dir) = repo_with_git_dir(&git);
        std::fs::create_dir(git_dir.path().join("rebase-merge")).unwrap();
        git.on("diff --check", GitOutput::ok(""));
        git.on(
            "status",
            GitOutput::ok("Unmerged paths:\n\tboth modified:   lib.rs\n"),
        );
        git.on("diff --name-only --diff-filter=U", GitOutput::ok("lib.rs\n"));

        let info = detector(&git).detect(&repo);
        assert_eq!(info.state, RepositoryState::ConflictsExist);
    }

    #[test]
    fn test_merge_in_progress() {
        let git = ScriptedGit::new();
        let (repo, git_dir) = repo_with_git_dir(&git);
        std::fs::write(git_dir.path().join("MERGE_HEAD"), "abc\n").unwrap();
        git.on("diff --check", GitOutput::ok(""));
        git.on("status", GitOutput::ok("All conflicts fixed but you are still merging.\n"));

        let info = detector(&git).detect(&repo);
        assert_eq!(info.state, RepositoryState::InMerge);
    }

    #[test]
    fn test_merge_with_conflicts() {
        let git = ScriptedGit::new();
        let (repo, git_dir) = repo_with_git_dir(&git);
        std::fs::write(git_dir.path().join("MERGE_HEAD"), "abc\n").unwrap();
        git.on("diff --check", GitOutput::ok(""));
        git.on("status", GitOutput::ok("Unmerged paths:\n\tdeleted by them: x\n"));

        let info = detector(&git).detect(&repo);
        assert_eq!(info.state, RepositoryState::ConflictsExist);
        assert_eq!(info.detail, "conflicts detected during merge operation");
    }

    #[test]
    fn test_git_failure_becomes_error_state() {
        let git = ScriptedGit::new();
        git.on_error("status --porcelain", "timed out after 30s");

        let info = detector(&git).detect(&sample_repo("api"));
        assert_eq!(info.state, RepositoryState::Error);
        assert!(info.error.unwrap().contains("timed out after 30s"));
    }

    #[test]
    fn test_non_zero_status_becomes_error_state() {
        let git = ScriptedGit::new();
        git.on("status --porcelain", GitOutput::failed("fatal: not a git repository"));

        let info = detector(&git).detect(&sample_repo("api"));
        assert_eq!(info.state, RepositoryState::Error);
    }

    #[test]
    fn test_detect_all_isolates_failures() {
        let git = ScriptedGit::new();
        let api = sample_repo("api");
        let web = sample_repo("web");
        git.on_in(&api.path, "status --porcelain", GitOutput::failed("fatal: broken"));
        git.on_in(&web.path, "status --porcelain", GitOutput::ok(""));

        let infos = detector(&git).detect_all(&[api, web]);
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].state, RepositoryState::Error);
        assert_eq!(infos[1].state, RepositoryState::ReadyForUpdate);
    }
}
