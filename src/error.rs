//! Error types for transitioner operations.
//!
//! Errors are split by subsystem:
//! - Configuration loading, validation and port-binding parsing
//! - Container runtime calls
//! - Run-level failures surfaced to the operator
//!
//! Only per-port parse errors and per-container teardown errors are
//! recovered locally. Everything else in [`HarnessError`] is fatal to the run.

use thiserror::Error;

/// Errors that can occur while loading or validating the run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No configuration file found (searched: {searched})")]
    NotFound { searched: String },

    #[error("Failed to read configuration file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Missing required field '{0}'")]
    MissingField(String),

    #[error("Duplicate service hostname '{0}'")]
    DuplicateHostname(String),

    #[error("Invalid port binding '{entry}': {reason}")]
    InvalidPortBinding { entry: String, reason: String },

    #[error("Invalid test command: {0}")]
    InvalidTestCommand(String),
}

/// Errors returned by a runtime gateway call.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Container runtime not available: {0}")]
    Unavailable(String),

    #[error("{operation} failed: {reason}")]
    RequestFailed { operation: String, reason: String },
}

impl RuntimeError {
    /// Builds a `RequestFailed` error for the given operation.
    pub fn request_failed(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::RequestFailed {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

/// Run-level errors.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Unable to resolve network '{network}': {source}")]
    RuntimeUnavailable {
        network: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Unable to {operation} {hostname}: {source}")]
    ProvisioningFailure {
        hostname: String,
        operation: &'static str,
        #[source]
        source: RuntimeError,
    },

    #[error("Test command '{command}' failed: {reason}")]
    TestExecutionFailure { command: String, reason: String },

    #[error("Unable to {operation} {hostname}: {source}")]
    TeardownFailure {
        hostname: String,
        operation: &'static str,
        #[source]
        source: RuntimeError,
    },
}
