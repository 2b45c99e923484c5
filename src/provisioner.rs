//! Container provisioning.
//!
//! Translates a [`ServiceDescriptor`] into a runtime container and drives the
//! per-container start and teardown calls.
//!
//! Port policy: each `host:container` entry is split on the first colon and
//! bound as a TCP port. A malformed entry is logged and skipped without
//! affecting the remaining entries; the skipped entries are kept on the
//! returned [`ContainerHandle`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{ConfigError, HarnessError};
use crate::runtime::{ContainerSpec, HostBinding, RuntimeGateway};
use crate::service::{ContainerHandle, ServiceDescriptor};

/// Public resolvers applied to every container, primary and secondary, IPv4 then IPv6.
pub const FALLBACK_DNS: [&str; 4] = [
    "8.8.8.8",
    "8.8.4.4",
    "2001:4860:4860::8888",
    "2001:4860:4860::8844",
];

/// Builds the runtime spec for a descriptor.
///
/// Returns the spec together with the port entries that could not be parsed.
pub fn container_spec(descriptor: &ServiceDescriptor) -> (ContainerSpec, Vec<ConfigError>) {
    let (bindings, errors) = descriptor.parse_ports();

    for err in &errors {
        warn!(hostname = %descriptor.hostname, "Skipping port binding: {}", err);
    }

    let dns: Vec<String> = FALLBACK_DNS.iter().map(|s| s.to_string()).collect();

    let spec = ContainerSpec {
        name: descriptor.hostname.clone(),
        image: descriptor.image.clone(),
        cmd: descriptor.command_tokens(),
        env: descriptor.env.clone(),
        hostname: descriptor.hostname.clone(),
        domainname: descriptor.hostname.clone(),
        exposed_ports: bindings.iter().map(|b| b.container_key()).collect(),
        port_bindings: bindings
            .iter()
            .map(|b| HostBinding {
                container_port: b.container_key(),
                host_port: b.host_port.to_string(),
            })
            .collect(),
        dns_search: dns.clone(),
        dns,
        network_mode: descriptor
            .network_name
            .clone()
            .or_else(|| descriptor.network_id.clone()),
        publish_all_ports: false,
    };

    (spec, errors)
}

/// Outcome of tearing down one container.
#[derive(Debug)]
pub struct ContainerTeardown {
    pub hostname: String,
    pub stopped: bool,
    pub removed: bool,
    pub errors: Vec<HarnessError>,
}

impl ContainerTeardown {
    /// Whether both the stop and the remove call succeeded.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Creates, starts and tears down containers through a runtime gateway.
#[derive(Clone)]
pub struct Provisioner {
    gateway: Arc<dyn RuntimeGateway>,
}

impl Provisioner {
    pub fn new(gateway: Arc<dyn RuntimeGateway>) -> Self {
        Self { gateway }
    }

    /// Creates the container for `descriptor` without starting it.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::ProvisioningFailure` naming the hostname if the
    /// runtime rejects the create call.
    pub async fn provision(&self, descriptor: &ServiceDescriptor) -> Result<ContainerHandle, HarnessError> {
        let (spec, port_errors) = container_spec(descriptor);
        debug!(hostname = %descriptor.hostname, image = %descriptor.image, "Creating container");

        let id = self
            .gateway
            .create_container(&spec)
            .await
            .map_err(|source| HarnessError::ProvisioningFailure {
                hostname: descriptor.hostname.clone(),
                operation: "create",
                source,
            })?;

        info!(hostname = %descriptor.hostname, id = %short_id(&id), "Created container");

        let skipped = port_errors
            .into_iter()
            .filter_map(|e| match e {
                ConfigError::InvalidPortBinding { entry, .. } => Some(entry),
                _ => None,
            })
            .collect();

        Ok(ContainerHandle::new(id, descriptor.clone(), skipped))
    }

    /// Starts a created container.
    pub async fn start(&self, handle: &ContainerHandle) -> Result<(), HarnessError> {
        self.gateway
            .start_container(handle.id())
            .await
            .map_err(|source| HarnessError::ProvisioningFailure {
                hostname: handle.hostname().to_string(),
                operation: "start",
                source,
            })?;

        info!(hostname = %handle.hostname(), "Started container");
        Ok(())
    }

    /// Stops and removes a container.
    ///
    /// The remove call is attempted even if the stop call fails. Failures are
    /// logged and returned in the report, never propagated.
    pub async fn stop_and_remove(&self, handle: &ContainerHandle) -> ContainerTeardown {
        let mut report = ContainerTeardown {
            hostname: handle.hostname().to_string(),
            stopped: false,
            removed: false,
            errors: Vec::new(),
        };

        match self.gateway.stop_container(handle.id()).await {
            Ok(()) => report.stopped = true,
            Err(source) => {
                let err = HarnessError::TeardownFailure {
                    hostname: report.hostname.clone(),
                    operation: "stop",
                    source,
                };
                warn!("{}", err);
                report.errors.push(err);
            }
        }

        match self.gateway.remove_container(handle.id()).await {
            Ok(()) => report.removed = true,
            Err(source) => {
                let err = HarnessError::TeardownFailure {
                    hostname: report.hostname.clone(),
                    operation: "remove",
                    source,
                };
                warn!("{}", err);
                report.errors.push(err);
            }
        }

        if report.is_clean() {
            info!(
                hostname = %report.hostname,
                image = %handle.descriptor().image,
                "Removed container"
            );
        }

        report
    }
}

/// Shortens a container ID for log output.
pub(crate) fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
