//! Daemon library: CLI definitions and command implementations.

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{run_worker, validate_config};
