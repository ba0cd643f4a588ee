//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// wp - single-host worker-pool scheduler
#[derive(Parser)]
#[command(
    name = "wp",
    about = "Keep a fleet of worker processes busy under weighted pool quotas",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/workpool/logs/workpool.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level override
    #[arg(short, long, global = true, help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)")]
    pub log_level: Option<String>,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    pub stderr: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler in the foreground until SIGINT/SIGTERM
    Run {
        /// Run a single tick and print what was dispatched
        #[arg(long)]
        once: bool,
    },

    /// Validate the config and print pools and worker commands
    Check,

    /// List processes matching a pattern
    Find {
        /// Regex matched against full command lines
        pattern: String,
    },

    /// Parse a command line and print its arguments
    Parse {
        /// Command line, quoted as one argument
        line: String,
    },
}
