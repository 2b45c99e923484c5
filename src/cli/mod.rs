//! Command-line interface for transitioner.
//!
//! Provides the `run` and `validate` commands.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
