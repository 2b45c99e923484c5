//! Run configuration loading.
//!
//! The configuration is read once from `transitioner.yaml` and is immutable
//! afterwards. Lookup order when no explicit path is given:
//! `$HOME/.config/transitioner/`, then the current directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::service::ServiceDescriptor;

/// Base name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "transitioner";

/// Default shutdown timeout in seconds.
const DEFAULT_KILL_TIMEOUT_SECS: u64 = 10;

fn default_kill_timeout() -> u64 {
    DEFAULT_KILL_TIMEOUT_SECS
}

fn default_cleanup() -> bool {
    true
}

/// The test workload run against the provisioned services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestConfig {
    /// Command line; split on whitespace and run without a shell.
    pub cmd: String,
    /// Working directory for the command.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Root configuration for one harness run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Name of the network shared by every service.
    pub network: String,
    /// Shutdown timeout in seconds, applied when the run is interrupted.
    #[serde(default = "default_kill_timeout")]
    pub kill_timeout: u64,
    /// Whether containers are stopped and removed at the end of the run.
    #[serde(default = "default_cleanup")]
    pub cleanup: bool,
    /// Services in creation order.
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
    /// Test workload.
    pub test: TestConfig,
}

impl RunConfig {
    /// Creates a configuration with defaults for the given network and test command.
    pub fn new(network: impl Into<String>, test_cmd: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            kill_timeout: DEFAULT_KILL_TIMEOUT_SECS,
            cleanup: true,
            services: Vec::new(),
            test: TestConfig {
                cmd: test_cmd.into(),
                dir: None,
            },
        }
    }

    /// Adds a service.
    pub fn with_service(mut self, service: ServiceDescriptor) -> Self {
        self.services.push(service);
        self
    }

    /// Sets the shutdown timeout.
    pub fn with_kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = timeout.as_secs();
        self
    }

    /// Enables or disables cleanup.
    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Sets the test working directory.
    pub fn with_test_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.test.dir = Some(dir.into());
        self
    }

    /// Returns the shutdown timeout as a `Duration`.
    pub fn kill_timeout(&self) -> Duration {
        Duration::from_secs(self.kill_timeout)
    }

    /// Time a container gets to exit on stop before it is killed: half the
    /// kill timeout, so the remove call still fits inside an interrupt deadline.
    pub fn stop_grace(&self) -> Duration {
        self.kill_timeout() / 2
    }

    /// Parses a configuration from YAML text and validates it.
    pub fn from_yaml(yaml: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from an explicit path.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content, &path.display().to_string())
    }

    /// Loads the configuration from `explicit` if given, otherwise from the
    /// first file found in the search path.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }

        let candidates = search_candidates();
        for candidate in &candidates {
            if candidate.is_file() {
                debug!(path = %candidate.display(), "Using configuration file");
                return Self::from_path(candidate);
            }
        }

        Err(ConfigError::NotFound {
            searched: candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Checks required fields and hostname uniqueness.
    ///
    /// Port bindings are not checked here; see [`RunConfig::port_warnings`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.trim().is_empty() {
            return Err(ConfigError::MissingField("network".to_string()));
        }
        if self.services.is_empty() {
            return Err(ConfigError::MissingField("services".to_string()));
        }

        let mut seen = HashSet::new();
        for (i, service) in self.services.iter().enumerate() {
            if service.hostname.trim().is_empty() {
                return Err(ConfigError::MissingField(format!("services[{i}].hostname")));
            }
            if service.image.trim().is_empty() {
                return Err(ConfigError::MissingField(format!("services[{i}].image")));
            }
            if !seen.insert(service.hostname.as_str()) {
                return Err(ConfigError::DuplicateHostname(service.hostname.clone()));
            }
        }

        if self.test.cmd.split_whitespace().next().is_none() {
            return Err(ConfigError::InvalidTestCommand(
                "test.cmd must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns every malformed port binding, tagged with its service hostname.
    pub fn port_warnings(&self) -> Vec<(String, ConfigError)> {
        self.services
            .iter()
            .flat_map(|service| {
                let (_, errors) = service.parse_ports();
                errors
                    .into_iter()
                    .map(move |e| (service.hostname.clone(), e))
            })
            .collect()
    }
}

/// Candidate configuration paths, in lookup order.
fn search_candidates() -> Vec<PathBuf> {
    let mut dirs_to_search = Vec::new();
    if let Some(config_dir) = dirs::home_dir().map(|home| home.join(".config").join(CONFIG_FILE_NAME)) {
        dirs_to_search.push(config_dir);
    }
    dirs_to_search.push(PathBuf::from("."));

    dirs_to_search
        .into_iter()
        .flat_map(|dir| {
            ["yaml", "yml"]
                .into_iter()
                .map(move |ext| dir.join(format!("{CONFIG_FILE_NAME}.{ext}")))
        })
        .collect()
}
