//! # Error Handling
//!
//! This module defines the centralized error type for the `kira` library. It
//! uses `thiserror` to derive a single `Error` enum whose variants carry the
//! context needed to tell the user what went wrong and, where possible, how to
//! fix it (rendered as an indented `hint:` line).
//!
//! ## Taxonomy
//!
//! - **Discovery errors** (`ConfigParse`, `WorkItem`, `FrontMatter`,
//!   `Discovery`, `TrunkBranch`): fatal, raised before any git-mutating call.
//! - **Git errors** (`GitCommand`): a git subprocess could not be spawned or
//!   timed out. Detection folds these into a per-repository `Error` state and
//!   the update pass records them as an ordinary step failure.
//! - **Terminal command errors** (`Blocked`, `UpdateFailed`): returned after
//!   all repositories were handled, so the binary exits non-zero.
//!
//! The `Result` alias is used throughout the library.

use std::path::PathBuf;

use thiserror::Error;

fn render_hint(hint: &Option<String>) -> String {
    hint.as_ref()
        .map(|h| format!("\n  hint: {}", h))
        .unwrap_or_default()
}

/// Main error type for kira operations
#[derive(Error, Debug)]
pub enum Error {
    /// The `kira.yml` configuration file could not be read or parsed.
    #[error("Configuration error in {}: {message}{}", path.display(), render_hint(hint))]
    ConfigParse {
        path: PathBuf,
        message: String,
        hint: Option<String>,
    },

    /// The current work item could not be located (none, or more than one).
    #[error("Work item error: {message}{}", render_hint(hint))]
    WorkItem {
        message: String,
        hint: Option<String>,
    },

    /// A work item's YAML front matter is missing or malformed.
    #[error("Front matter error in {}: {message}", path.display())]
    FrontMatter { path: PathBuf, message: String },

    /// One or more repositories of the work item failed validation.
    #[error("Repository discovery failed:\n{}", failures.iter().map(|f| format!("  - {}", f)).collect::<Vec<_>>().join("\n"))]
    Discovery { failures: Vec<String> },

    /// The trunk branch of a repository could not be resolved.
    #[error("Cannot resolve trunk branch for {repo}: {message}{}", render_hint(hint))]
    TrunkBranch {
        repo: String,
        message: String,
        hint: Option<String>,
    },

    /// A git subprocess could not be run or did not finish in time.
    #[error("git {command} failed in {}: {stderr}", path.display())]
    GitCommand {
        command: String,
        path: PathBuf,
        stderr: String,
    },

    /// The workspace is in a state that must be resolved before updating.
    #[error("Update blocked: {state} in {}", repos.join(", "))]
    Blocked { state: String, repos: Vec<String> },

    /// At least one repository failed during the update pass.
    #[error("{} of {total} repositories failed to update: {}", failed.len(), failed.join(", "))]
    UpdateFailed { failed: Vec<String>, total: usize },

    /// A mutex guarding shared progress state was poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// The worker pool for the update pass could not be started.
    #[error("Cannot start update workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
