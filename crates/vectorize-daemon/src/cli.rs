//! CLI argument parsing for the vectorize daemon.

use clap::{Parser, Subcommand};

/// Vectorize Daemon
///
/// Runs the vectorization worker: leases document-processing requests from
/// the configured sources and executes pipeline steps.
#[derive(Parser, Debug)]
#[command(name = "vectorize-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/vectorize/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Daemon commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the vectorization worker in the foreground
    Run {
        /// Override the state store directory
        #[arg(long)]
        state_path: Option<String>,
    },

    /// Load and validate the configuration without starting the worker
    Validate,
}
