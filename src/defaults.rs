//! Default values for kira configuration and git handling.
//!
//! This module provides centralized default values used across the library,
//! ensuring consistency and avoiding duplication.

use std::time::Duration;

/// Name of the configuration file looked up in the current directory.
pub const CONFIG_FILE: &str = "kira.yml";

/// Folder holding work items, relative to the configuration directory.
pub const WORK_FOLDER: &str = ".work";

/// Status folder of the work item currently being worked on.
pub const DOING_FOLDER: &str = "2_doing";

/// Remote used when neither the project nor `git.remote` name one.
pub const REMOTE: &str = "origin";

/// Candidate trunk branch names probed during auto-detection.
pub const TRUNK_CANDIDATES: [&str; 2] = ["main", "master"];

/// Timeout for quick local git commands (status, rev-parse, stash).
pub const COMMAND_TIMEOUT_SECS: u64 = 30;

/// Timeout for `git fetch`.
pub const FETCH_TIMEOUT_SECS: u64 = 120;

/// Timeout for `git rebase` and `git rebase --continue`.
pub const REBASE_TIMEOUT_SECS: u64 = 120;

/// Lines of context shown on each side of a conflict region.
pub const CONFLICT_CONTEXT_LINES: usize = 3;

/// Conflicted files larger than this are not parsed.
pub const MAX_CONFLICT_FILE_BYTES: u64 = 1024 * 1024;

/// Converts a timeout in seconds into a `Duration`, treating 0 as the default.
pub fn timeout_or(seconds: u64, default_secs: u64) -> Duration {
    if seconds == 0 {
        Duration::from_secs(default_secs)
    } else {
        Duration::from_secs(seconds)
    }
}
