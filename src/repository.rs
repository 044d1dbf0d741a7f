//! # Repository Identity and Live State
//!
//! Types describing the repositories that belong to the current work item
//! and the state each one was found in.
//!
//! `RepositoryInfo` is resolved once per invocation by discovery and never
//! changes afterwards. `RepositoryState` is always recomputed from the
//! working tree on disk; nothing here is cached between invocations.

use std::fmt;
use std::path::PathBuf;

/// Identity and resolved git parameters of one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// Display label (project name, or the directory name when standalone).
    pub name: String,
    /// Absolute path of the working tree.
    pub path: PathBuf,
    /// Branch feature work is rebased onto.
    pub trunk_branch: String,
    /// Remote the trunk branch is fetched from.
    pub remote: String,
    /// Set when several projects are mounted from one physical git root.
    pub shared_root_key: Option<String>,
}

impl RepositoryInfo {
    /// `<remote>/<trunk>`, the ref every repository is rebased onto.
    pub fn upstream(&self) -> String {
        format!("{}/{}", self.remote, self.trunk_branch)
    }
}

/// Live state of one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryState {
    ReadyForUpdate,
    ConflictsExist,
    DirtyWorkingDirectory,
    InRebase,
    InMerge,
    Error,
}

impl RepositoryState {
    /// Whether the update pass may stash/fetch/rebase this repository.
    pub fn is_updatable(self) -> bool {
        matches!(
            self,
            RepositoryState::ReadyForUpdate | RepositoryState::DirtyWorkingDirectory
        )
    }
}

impl fmt::Display for RepositoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RepositoryState::ReadyForUpdate => "ready for update",
            RepositoryState::ConflictsExist => "conflicts exist",
            RepositoryState::DirtyWorkingDirectory => "uncommitted changes",
            RepositoryState::InRebase => "rebase in progress",
            RepositoryState::InMerge => "merge in progress",
            RepositoryState::Error => "error",
        };
        f.write_str(label)
    }
}

/// Result of one detection pass over one repository.
#[derive(Debug, Clone)]
pub struct RepositoryStateInfo {
    pub repo: RepositoryInfo,
    pub state: RepositoryState,
    /// Human readable explanation of the state.
    pub detail: String,
    /// Files with unresolved conflicts, relative to the repository root.
    pub conflicted_files: Vec<String>,
    /// Underlying failure message when `state` is `Error`.
    pub error: Option<String>,
}

impl RepositoryStateInfo {
    pub fn new(repo: RepositoryInfo, state: RepositoryState, detail: impl Into<String>) -> Self {
        Self {
            repo,
            state,
            detail: detail.into(),
            conflicted_files: Vec::new(),
            error: None,
        }
    }

    pub fn with_conflicted_files(mut self, files: Vec<String>) -> Self {
        self.conflicted_files = files;
        self
    }

    pub fn failed(repo: RepositoryInfo, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            repo,
            state: RepositoryState::Error,
            detail: format!("state check failed: {}", error),
            conflicted_files: Vec::new(),
            error: Some(error),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_repo(name: &str) -> RepositoryInfo {
    RepositoryInfo {
        name: name.to_string(),
        path: PathBuf::from(format!("/work/{}", name)),
        trunk_branch: "main".to_string(),
        remote: "origin".to_string(),
        shared_root_key: None,
    }
}
