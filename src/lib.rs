//! transitioner: ephemeral multi-container test harness.
//!
//! Creates a shared network and a set of service containers, streams their
//! logs, runs a test command against them, and tears the containers down
//! exactly once, even when interrupted.

pub mod cli;
pub mod config;
pub mod error;
pub mod network;
pub mod orchestrator;
pub mod provisioner;
pub mod runtime;
pub mod service;
pub mod signal;
pub mod test_runner;
pub mod watcher;

pub use error::{ConfigError, HarnessError, RuntimeError};
