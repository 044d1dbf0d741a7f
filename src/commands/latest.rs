//! Latest command implementation
//!
//! Runs the full `latest` operation against the current directory:
//! 1. Discovery of the work item's repositories
//! 2. Sequential state detection and aggregation
//! 3. Conflict display, rebase continuation or merge guidance when blocked
//! 4. Concurrent stash / fetch / rebase / restore otherwise
//! 5. Per-repository report with recovery steps

use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;

use kira::config::Config;
use kira::defaults;
use kira::git::SystemGit;
use kira::output::{emoji, OutputConfig};
use kira::phases::orchestrator;
use kira::phases::update::UpdateOptions;

/// Arguments for the latest command
#[derive(Args, Debug)]
pub struct LatestArgs {
    /// Leave stashed local changes in the stash after a successful update
    #[arg(long)]
    pub no_pop_stash: bool,

    /// Abort a rebase that stops on conflicts instead of leaving it for resolution
    #[arg(long)]
    pub abort_on_conflict: bool,
}

/// Directory that relative paths in the configuration are resolved against.
fn config_dir(config_path: &Path) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Cannot determine the current directory")?;
    Ok(match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => cwd.join(parent),
        _ => cwd,
    })
}

/// Execute the latest command
pub fn execute(args: LatestArgs, config: Option<PathBuf>, output: OutputConfig) -> Result<()> {
    let start_time = Instant::now();

    let config_path = config.unwrap_or_else(|| PathBuf::from(defaults::CONFIG_FILE));
    let settings = Config::load(&config_path)?;
    let root = config_dir(&config_path)?;
    log::debug!("configuration {} (root {})", config_path.display(), root.display());

    let options = UpdateOptions {
        no_pop_stash: args.no_pop_stash,
        abort_on_conflict: args.abort_on_conflict,
    };

    let mut stdout = io::stdout();
    orchestrator::execute_latest(&settings, &root, &SystemGit, options, output, &mut stdout)?;

    println!(
        "{} Done in {:.2}s",
        emoji(&output, "✅", "[OK]"),
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}
