//! The phases of the `kira latest` operation.
//!
//! ## Overview
//!
//! 1. Discovery - Resolve the work item's repositories and their git parameters
//! 2. Detection - Classify each repository's live state (sequential)
//! 3. Aggregation - Reduce the states to one workspace verdict
//! 4. Ordering - Group repositories sharing a physical root into a worklist
//! 5. Update - Stash, fetch, rebase and restore, one worker per working tree
//! 6. Report - Step traces, recovery instructions and the final status
//!
//! A verdict of unresolved conflicts, a leftover rebase or a merge in progress
//! ends the run after phase 3: conflicts are displayed, a leftover rebase is
//! continued (`continuation`), a merge gets guidance.
//!
//! Each phase depends only on the previous phases and the foundation modules
//! (`config`, `git`, `repository`, `conflict`).

pub mod aggregate;
pub mod continuation;
pub mod detection;
pub mod discovery;
pub mod orchestrator;
pub mod ordering;
pub mod report;
pub mod update;
