//! # kira
//!
//! This library implements `kira latest`: bring every repository touched by
//! the current work item up to date with its trunk branch, safely, in one
//! command. It is used by the `kira` command-line tool.
//!
//! ## Quick Example
//!
//! ```
//! use kira::conflict::parse_conflicts;
//!
//! let regions = parse_conflicts(b"<<<<<<< HEAD\nA\n=======\nB\n>>>>>>> feature\n");
//! assert_eq!(regions.len(), 1);
//! assert_eq!(regions[0].ours, "A");
//! assert_eq!(regions[0].theirs, "B");
//! ```
//!
//! ## Core Concepts
//!
//! - **Configuration (`config`, `work_item`)**: `kira.yml` describes the
//!   workspace topology (standalone, monorepo or polyrepo) and git defaults;
//!   the single work item in the "doing" folder names what is being worked on.
//! - **Git (`git`)**: every git interaction goes through the `GitRunner`
//!   trait, implemented by `SystemGit` on top of the `git` binary with a
//!   timeout per invocation.
//! - **Repository state (`repository`, `conflict`)**: the live state of each
//!   working tree, always recomputed from disk, and the conflict marker parser
//!   used to display unresolved conflicts.
//! - **Phases (`phases`)**: discovery, detection, aggregation, ordering, the
//!   concurrent update pass and reporting.
//!
//! ## Execution Flow
//!
//! The main entry point is `phases::orchestrator::execute_latest`:
//!
//! 1.  **Discovery**: find the work item and resolve its repositories.
//! 2.  **Detection**: classify every repository, one after another.
//! 3.  **Aggregation**: conflicts, a leftover rebase or a merge in progress
//!     anywhere stop the run before anything is mutated.
//! 4.  **Update**: stash, fetch, rebase and restore each repository
//!     concurrently, compensating on failure.
//! 5.  **Report**: per-repository step traces with exact recovery steps.
//!
//! Nothing is persisted between runs: an interrupted run is picked up by the
//! next one's detection pass.

pub mod config;
pub mod conflict;
pub mod defaults;
pub mod error;
pub mod git;
pub mod output;
pub mod phases;
pub mod repository;
pub mod work_item;

#[cfg(test)]
mod conflict_proptest;
#[cfg(test)]
mod testing;
