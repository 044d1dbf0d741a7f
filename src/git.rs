//! # Git Subprocess Layer
//!
//! Every git interaction in kira goes through the system `git` binary, which
//! automatically honours the user's SSH keys, credential helpers and
//! `~/.gitconfig`. This module owns that boundary:
//!
//! - **`GitRunner`**: the trait the rest of the library calls. It lets tests
//!   swap the real binary for a scripted double.
//! - **`SystemGit`**: the production implementation. Each invocation runs with
//!   piped output, `LC_ALL=C` so the text we scrape is stable, terminal
//!   prompts disabled, and a deadline after which the child is killed.
//! - Small query helpers (`git_dir`, `current_branch`, `branch_exists`, ...)
//!   and the fetch failure classifier used for friendlier messages.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::{Error, Result};

/// How often a running child is polled against its deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured result of one git invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    /// Whether git exited with status 0.
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    /// A successful invocation with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed invocation with the given stderr.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Stdout followed by stderr, trimmed, for messages and keyword scans.
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, _) => stderr.to_string(),
            (false, true) => stdout.to_string(),
            (false, false) => format!("{}\n{}", stdout, stderr),
        }
    }
}

/// Per-invocation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// The child is killed once this much time has passed.
    pub timeout: Duration,
    /// Suppress editors and pagers (`GIT_EDITOR=true`, `GIT_PAGER=cat`).
    pub non_interactive: bool,
}

impl RunOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            non_interactive: false,
        }
    }

    pub fn non_interactive(mut self) -> Self {
        self.non_interactive = true;
        self
    }
}

/// Trait for running git commands - allows scripting in tests
pub trait GitRunner: Send + Sync {
    /// Runs `git <args>` inside `dir`.
    ///
    /// A non-zero exit status is *not* an error: it is reported through
    /// `GitOutput::success`. `Err` means git could not be spawned or exceeded
    /// its timeout.
    fn run(&self, dir: &Path, args: &[&str], options: RunOptions) -> Result<GitOutput>;
}

/// The default implementation of `GitRunner`, which uses the system's `git`
/// command.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemGit;

impl GitRunner for SystemGit {
    fn run(&self, dir: &Path, args: &[&str], options: RunOptions) -> Result<GitOutput> {
        run_git(dir, args, options)
    }
}

/// Run the system git binary with a deadline.
pub fn run_git(dir: &Path, args: &[&str], options: RunOptions) -> Result<GitOutput> {
    let label = args.join(" ");
    debug!("git {} (in {})", label, dir.display());

    let mut command = Command::new("git");
    command
        .args(args)
        .current_dir(dir)
        .env("LC_ALL", "C")
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if options.non_interactive {
        command
            .env("GIT_EDITOR", "true")
            .env("GIT_SEQUENCE_EDITOR", "true")
            .env("GIT_PAGER", "cat");
    }

    let mut child = command
        .spawn()
        .map_err(|e| command_error(dir, &label, e.to_string()))?;

    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let deadline = Instant::now() + options.timeout;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                warn!(
                    "git {} in {} exceeded {}s, killing it",
                    label,
                    dir.display(),
                    options.timeout.as_secs()
                );
                // The child may have exited between try_wait and kill.
                if let Err(e) = child.kill() {
                    debug!("kill after timeout: {}", e);
                }
                child.wait()?;
                return Err(command_error(
                    dir,
                    &label,
                    format!("timed out after {}s", options.timeout.as_secs()),
                ));
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    };

    let stdout = collect_reader(stdout_reader);
    let stderr = collect_reader(stderr_reader);

    debug!("git {} exited with {:?}", label, status.code());

    Ok(GitOutput {
        success: status.success(),
        stdout,
        stderr,
    })
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut source) = source {
            if let Err(e) = source.read_to_end(&mut buffer) {
                debug!("reading git output: {}", e);
            }
        }
        buffer
    })
}

fn collect_reader(handle: thread::JoinHandle<Vec<u8>>) -> String {
    match handle.join() {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::new(),
    }
}

fn command_error(dir: &Path, command: &str, stderr: String) -> Error {
    Error::GitCommand {
        command: command.to_string(),
        path: dir.to_path_buf(),
        stderr,
    }
}

/// Turn a non-zero git exit into an `Error::GitCommand`.
pub fn require_success(dir: &Path, args: &[&str], output: GitOutput) -> Result<GitOutput> {
    if output.success {
        Ok(output)
    } else {
        Err(command_error(dir, &args.join(" "), output.combined()))
    }
}

/// Resolve the repository's metadata directory.
///
/// Uses `git rev-parse --git-dir` so linked worktrees resolve to their own
/// `.git/worktrees/<name>` directory, falling back to `<path>/.git`.
pub fn git_dir(git: &dyn GitRunner, repo: &Path, options: RunOptions) -> PathBuf {
    match git.run(repo, &["rev-parse", "--git-dir"], options) {
        Ok(output) if output.success && !output.stdout.trim().is_empty() => {
            let dir = PathBuf::from(output.stdout.trim());
            if dir.is_absolute() {
                dir
            } else {
                repo.join(dir)
            }
        }
        _ => repo.join(".git"),
    }
}

/// Whether a rebase has been started and not yet finished or aborted.
pub fn rebase_in_progress(git_dir: &Path) -> bool {
    git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists()
}

/// Whether a merge has been started and not yet committed or aborted.
pub fn merge_in_progress(git_dir: &Path) -> bool {
    git_dir.join("MERGE_HEAD").exists()
}

/// Whether `path` is inside a git working tree.
pub fn is_repository(git: &dyn GitRunner, path: &Path, options: RunOptions) -> bool {
    matches!(
        git.run(path, &["rev-parse", "--git-dir"], options),
        Ok(output) if output.success
    )
}

/// The checked-out branch name, or `HEAD` when detached.
pub fn current_branch(git: &dyn GitRunner, repo: &Path, options: RunOptions) -> Result<String> {
    let args = ["rev-parse", "--abbrev-ref", "HEAD"];
    let output = require_success(repo, &args, git.run(repo, &args, options)?)?;
    Ok(output.stdout.trim().to_string())
}

/// Whether the local branch `refs/heads/<branch>` exists.
pub fn branch_exists(
    git: &dyn GitRunner,
    repo: &Path,
    branch: &str,
    options: RunOptions,
) -> Result<bool> {
    let reference = format!("refs/heads/{}", branch);
    let output = git.run(
        repo,
        &["show-ref", "--verify", "--quiet", &reference],
        options,
    )?;
    Ok(output.success)
}

/// Whether a remote with this name is configured.
pub fn remote_exists(
    git: &dyn GitRunner,
    repo: &Path,
    remote: &str,
    options: RunOptions,
) -> Result<bool> {
    let output = git.run(repo, &["remote", "get-url", remote], options)?;
    Ok(output.success)
}

/// Files with unmerged index entries, as reported by git.
pub fn unmerged_files(
    git: &dyn GitRunner,
    repo: &Path,
    options: RunOptions,
) -> Result<Vec<String>> {
    let args = ["diff", "--name-only", "--diff-filter=U"];
    let output = require_success(repo, &args, git.run(repo, &args, options)?)?;
    Ok(output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Why a `git fetch` failed. Only used to phrase the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    Network,
    Permission,
    BranchNotFound,
    Other,
}

impl FetchFailure {
    pub fn describe(self) -> &'static str {
        match self {
            FetchFailure::Network => "network error",
            FetchFailure::Permission => "permission or authentication error",
            FetchFailure::BranchNotFound => "trunk branch not found on remote",
            FetchFailure::Other => "fetch failed",
        }
    }
}

/// Classify `git fetch` output.
pub fn classify_fetch_failure(output: &str) -> FetchFailure {
    let lower = output.to_lowercase();

    if lower.contains("couldn't find remote ref") || lower.contains("not our ref") {
        return FetchFailure::BranchNotFound;
    }

    let network_markers = [
        "could not resolve host",
        "connection refused",
        "connection timed out",
        "network is unreachable",
        "timed out after",
        "connection reset",
    ];
    if network_markers.iter().any(|m| lower.contains(m)) {
        return FetchFailure::Network;
    }

    let permission_markers = [
        "permission denied",
        "authentication failed",
        "could not read username",
        "could not read from remote repository",
        "403",
    ];
    if permission_markers.iter().any(|m| lower.contains(m)) {
        return FetchFailure::Permission;
    }

    if lower.contains("unable to access") {
        return FetchFailure::Network;
    }

    FetchFailure::Other
}

/// Whether git output reports merge conflicts.
pub fn mentions_conflict(output: &str) -> bool {
    output.contains("CONFLICT") || output.to_lowercase().contains("conflict")
}
