//! Ordering: arrange repositories into the update worklist.
//!
//! ## Process
//!
//! 1.  **Grouping**: repositories mounted from the same physical git root
//!     (same `shared_root_key`) are placed next to each other, in their
//!     configuration order.
//!
//! 2.  **Groups first**: groups are emitted in order of their first member,
//!     followed by every repository with no shared root.
//!
//! The order decides how repositories are handed to the update pass and how
//! they are reported. It is not an execution barrier: the update pass still
//! runs every entry concurrently.

use crate::repository::RepositoryInfo;

/// Produce the worklist order.
pub fn execute(repos: &[RepositoryInfo]) -> Vec<RepositoryInfo> {
    let mut groups: Vec<(&str, Vec<RepositoryInfo>)> = Vec::new();
    let mut standalone = Vec::new();

    for repo in repos {
        match repo.shared_root_key.as_deref() {
            Some(key) => match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(repo.clone()),
                None => groups.push((key, vec![repo.clone()])),
            },
            None => standalone.push(repo.clone()),
        }
    }

    groups
        .into_iter()
        .flat_map(|(_, members)| members)
        .chain(standalone)
        .collect()
}
