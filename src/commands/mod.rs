//! # CLI Command Implementations
//!
//! Each subcommand of the `kira` command-line tool lives in its own file with:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and calls into the
//!   `kira` library to perform the work.

pub mod completions;
pub mod latest;
