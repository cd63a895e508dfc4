//! Vectorize Daemon
//!
//! Runs the vectorization worker: leases document-processing requests from
//! the configured sources and executes pipeline steps.
//!
//! # Usage
//!
//! ```bash
//! vectorize-daemon run [--state-path PATH]
//! vectorize-daemon validate
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/vectorize/config.toml)
//! 3. Environment variables (VECTORIZE_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use vectorize_daemon::{run_worker, validate_config, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { state_path } => {
            run_worker(
                cli.config.as_deref(),
                state_path.as_deref(),
                cli.log_level.as_deref(),
            )
            .await?;
        }
        Commands::Validate => {
            validate_config(cli.config.as_deref())?;
        }
    }

    Ok(())
}
