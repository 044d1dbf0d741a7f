//! State aggregation: one verdict for the whole workspace.
//!
//! The overall state is the highest-priority state found in any repository,
//! read from an explicit table:
//!
//! | Priority | State |
//! |---|---|
//! | 1 | `ConflictsExist` |
//! | 2 | `InRebase` |
//! | 3 | `InMerge` |
//! | 4 | `DirtyWorkingDirectory` |
//! | 5 | `Error` |
//! | 6 | `ReadyForUpdate` |
//!
//! Conflicts and in-progress operations rank first because they block the
//! update pass for every repository: nothing is fetched or rebased while any
//! sibling is mid-operation.

use crate::repository::{RepositoryState, RepositoryStateInfo};

/// States in descending priority.
pub const STATE_PRIORITY: [RepositoryState; 6] = [
    RepositoryState::ConflictsExist,
    RepositoryState::InRebase,
    RepositoryState::InMerge,
    RepositoryState::DirtyWorkingDirectory,
    RepositoryState::Error,
    RepositoryState::ReadyForUpdate,
];

/// Workspace-wide verdict plus repository names bucketed by category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedState {
    pub overall: RepositoryState,
    pub conflicting: Vec<String>,
    pub dirty: Vec<String>,
    /// Repositories with a rebase or merge in progress.
    pub in_operation: Vec<String>,
    pub errors: Vec<String>,
    pub ready: Vec<String>,
}

/// Reduce per-repository states to one verdict.
pub fn aggregate(infos: &[RepositoryStateInfo]) -> AggregatedState {
    let overall = STATE_PRIORITY
        .iter()
        .copied()
        .find(|state| infos.iter().any(|info| info.state == *state))
        .unwrap_or(RepositoryState::ReadyForUpdate);

    let names = |wanted: &[RepositoryState]| -> Vec<String> {
        infos
            .iter()
            .filter(|info| wanted.contains(&info.state))
            .map(|info| info.repo.name.clone())
            .collect()
    };

    AggregatedState {
        overall,
        conflicting: names(&[RepositoryState::ConflictsExist]),
        dirty: names(&[RepositoryState::DirtyWorkingDirectory]),
        in_operation: names(&[RepositoryState::InRebase, RepositoryState::InMerge]),
        errors: names(&[RepositoryState::Error]),
        ready: names(&[RepositoryState::ReadyForUpdate]),
    }
}
