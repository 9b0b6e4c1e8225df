//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// metricwatch - threshold-monitoring sidecar
#[derive(Parser)]
#[command(
    name = "mw",
    about = "Samples a metric on a fixed interval and fires tiered actions on sustained threshold violations",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute; defaults to `run`
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the monitor loop (default)
    Run,

    /// Load and validate configuration, then exit
    CheckConfig,

    /// List the built-in actions
    ListActions,
}
