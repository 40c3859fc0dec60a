//! Command-line interface for r2r.
//!
//! Provides commands for verifying scripts, extracting evidence from logs,
//! and checking the Docker setup.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
