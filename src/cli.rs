//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;

use crate::commands;
use kira::output::OutputConfig;

/// kira - keep every repository of the current work item current with trunk
#[derive(Parser, Debug)]
#[command(name = "kira")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(
        long,
        global = true,
        value_name = "WHEN",
        default_value = "auto",
        value_parser = ["always", "never", "auto"]
    )]
    color: String,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(
        long,
        global = true,
        value_name = "LEVEL",
        default_value = "warn",
        value_parser = ["off", "error", "warn", "info", "debug", "trace"]
    )]
    log_level: String,

    /// Path to the kira configuration file (default: ./kira.yml)
    #[arg(long, global = true, value_name = "PATH", env = "KIRA_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Update every repository of the current work item with its trunk branch
    Latest(commands::latest::LatestArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);
        let output = OutputConfig::from_env_and_flag(&self.color);

        match self.command {
            Commands::Latest(args) => commands::latest::execute(args, self.config, output),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}

/// Log to stderr so stdout stays the progress stream.
fn init_logging(level: &str) {
    let initialised = env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .try_init();
    if initialised.is_err() {
        eprintln!("warning: logger already initialised");
    }
}
