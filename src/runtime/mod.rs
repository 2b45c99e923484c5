//! Container runtime gateway.
//!
//! The lifecycle manager depends only on the [`RuntimeGateway`] trait. The
//! Docker implementation lives in [`docker_client`] and talks to the Engine
//! API through the bollard crate.

pub mod docker_client;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::RuntimeError;

pub use docker_client::DockerClient;

/// Summary of an existing network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
}

/// Options for creating a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: String,
    pub attachable: bool,
    pub enable_ipv6: bool,
    pub internal: bool,
    /// IP address management driver.
    pub ipam_driver: String,
}

impl NetworkSpec {
    /// A bridged, attachable, IPv4-only network with default IPAM.
    pub fn bridge(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: "bridge".to_string(),
            attachable: true,
            enable_ipv6: false,
            internal: false,
            ipam_driver: "default".to_string(),
        }
    }
}

/// Host side of a port binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBinding {
    /// Container port key, e.g. `80/tcp`.
    pub container_port: String,
    pub host_port: String,
}

/// Everything the runtime needs to create one container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,
    pub image: String,
    pub cmd: Option<Vec<String>>,
    pub env: Vec<String>,
    pub hostname: String,
    pub domainname: String,
    /// Exposed container ports, e.g. `80/tcp`.
    pub exposed_ports: Vec<String>,
    pub port_bindings: Vec<HostBinding>,
    pub dns: Vec<String>,
    pub dns_search: Vec<String>,
    /// Network the container joins.
    pub network_mode: Option<String>,
    pub publish_all_ports: bool,
}

/// Options for a container log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    pub follow: bool,
    pub timestamps: bool,
    /// `None` means the whole history.
    pub tail: Option<u64>,
}

impl Default for LogOptions {
    /// Whole history, then follow, with timestamps.
    fn default() -> Self {
        Self {
            follow: true,
            timestamps: true,
            tail: None,
        }
    }
}

/// A stream of raw combined stdout/stderr log chunks.
pub type LogStream = BoxStream<'static, Result<String, RuntimeError>>;

/// Capability interface over the container runtime.
#[async_trait]
pub trait RuntimeGateway: Send + Sync {
    /// Lists existing networks.
    async fn list_networks(&self) -> Result<Vec<NetworkSummary>, RuntimeError>;

    /// Creates a network and returns its ID.
    async fn create_network(&self, spec: &NetworkSpec) -> Result<String, RuntimeError>;

    /// Creates a container and returns its ID. The container is not started.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    /// Starts a created container.
    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Stops a running container.
    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Removes a container.
    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Opens a combined stdout/stderr log stream.
    async fn stream_logs(&self, id: &str, options: LogOptions) -> Result<LogStream, RuntimeError>;
}
