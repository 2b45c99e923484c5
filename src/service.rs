//! Service descriptors and the handles created from them.
//!
//! A [`ServiceDescriptor`] is the static template for one container. Once a
//! container has been created from it the runtime identity is tracked by a
//! [`ContainerHandle`], owned by the lifecycle manager for the whole run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Static definition of one container to create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Image reference, e.g. `nginx:1.25`.
    pub image: String,
    /// Command line; split on whitespace. Empty keeps the image default.
    #[serde(default)]
    pub cmd: String,
    /// Port bindings in `hostPort:containerPort` form.
    #[serde(default)]
    pub ports: Vec<String>,
    /// Environment entries in `KEY=VALUE` form, passed verbatim.
    #[serde(default)]
    pub env: Vec<String>,
    /// Hostname, also used as domain name and container name.
    pub hostname: String,
    /// Identifier of the network to join. Filled in by the lifecycle manager.
    #[serde(default)]
    pub network_id: Option<String>,
    /// Name of the network to join. Filled in by the lifecycle manager.
    #[serde(default)]
    pub network_name: Option<String>,
}

impl ServiceDescriptor {
    /// Creates a descriptor with the given image and hostname.
    pub fn new(image: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            hostname: hostname.into(),
            ..Default::default()
        }
    }

    /// Sets the command line.
    pub fn with_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.cmd = cmd.into();
        self
    }

    /// Adds a `hostPort:containerPort` binding.
    pub fn with_port(mut self, binding: impl Into<String>) -> Self {
        self.ports.push(binding.into());
        self
    }

    /// Adds a `KEY=VALUE` environment entry.
    pub fn with_env(mut self, entry: impl Into<String>) -> Self {
        self.env.push(entry.into());
        self
    }

    /// Attaches the network unless the descriptor already names one by ID or name.
    pub fn attach_network(&mut self, network: &NetworkRef) {
        if self.network_id.is_none() && self.network_name.is_none() {
            self.network_id = Some(network.id.clone());
            self.network_name = Some(network.name.clone());
        }
    }

    /// Splits the command line into argv tokens.
    ///
    /// Returns `None` for an empty command so the image default is kept.
    pub fn command_tokens(&self) -> Option<Vec<String>> {
        let tokens: Vec<String> = self.cmd.split_whitespace().map(str::to_string).collect();
        if tokens.is_empty() {
            None
        } else {
            Some(tokens)
        }
    }

    /// Parses every port binding, separating well-formed entries from malformed ones.
    pub fn parse_ports(&self) -> (Vec<PortBinding>, Vec<ConfigError>) {
        let mut bindings = Vec::with_capacity(self.ports.len());
        let mut errors = Vec::new();

        for entry in &self.ports {
            match entry.parse::<PortBinding>() {
                Ok(binding) => bindings.push(binding),
                Err(e) => errors.push(e),
            }
        }

        (bindings, errors)
    }
}

/// A single `hostPort:containerPort` mapping. The container side is always TCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortBinding {
    pub host_port: u16,
    pub container_port: u16,
}

impl PortBinding {
    /// Runtime key for the container side, e.g. `80/tcp`.
    pub fn container_key(&self) -> String {
        format!("{}/tcp", self.container_port)
    }
}

impl fmt::Display for PortBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host_port, self.container_port)
    }
}

impl std::str::FromStr for PortBinding {
    type Err = ConfigError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidPortBinding {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        let (host, container) = entry
            .split_once(':')
            .ok_or_else(|| invalid("expected hostPort:containerPort"))?;

        if host.is_empty() || container.is_empty() {
            return Err(invalid("both host and container port are required"));
        }

        let host_port = parse_port(host).ok_or_else(|| invalid("host port is not a valid port"))?;
        let container_port =
            parse_port(container).ok_or_else(|| invalid("container port is not a valid port"))?;

        Ok(Self {
            host_port,
            container_port,
        })
    }
}

fn parse_port(s: &str) -> Option<u16> {
    match s.trim().parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}

/// A resolved network shared by every container of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRef {
    pub id: String,
    pub name: String,
}

/// Runtime identity of one provisioned container.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    /// Runtime-assigned container ID.
    id: String,
    /// Descriptor the container was created from.
    descriptor: ServiceDescriptor,
    /// Port entries that were skipped as malformed.
    skipped_ports: Vec<String>,
}

impl ContainerHandle {
    pub fn new(id: impl Into<String>, descriptor: ServiceDescriptor, skipped_ports: Vec<String>) -> Self {
        Self {
            id: id.into(),
            descriptor,
            skipped_ports,
        }
    }

    /// Returns the container ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the container hostname.
    pub fn hostname(&self) -> &str {
        &self.descriptor.hostname
    }

    /// Returns the descriptor the container was created from.
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Returns the port entries skipped during provisioning.
    pub fn skipped_ports(&self) -> &[String] {
        &self.skipped_ports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_binding() {
        let binding: PortBinding = "8080:80".parse().unwrap();
        assert_eq!(binding.host_port, 8080);
        assert_eq!(binding.container_port, 80);
        assert_eq!(binding.container_key(), "80/tcp");
        assert_eq!(binding.to_string(), "8080:80");
    }

    #[test]
    fn test_parse_port_binding_rejects_malformed() {
        for entry in ["badentry", ":80", "8080:", "abc:80", "8080:http", "0:80", "70000:80"] {
            let result = entry.parse::<PortBinding>();
            assert!(
                matches!(result, Err(ConfigError::InvalidPortBinding { .. })),
                "{entry} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_port_binding_splits_on_first_colon() {
        // "127.0.0.1" is not a port, so the whole entry is malformed
        assert!("127.0.0.1:8080:80".parse::<PortBinding>().is_err());
    }

    #[test]
    fn test_parse_ports_keeps_good_entries() {
        let service = ServiceDescriptor::new("nginx", "web")
            .with_port("8080:80")
            .with_port("badentry")
            .with_port("8443:443");

        let (bindings, errors) = service.parse_ports();
        assert_eq!(bindings.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(bindings[1].container_port, 443);
    }

    #[test]
    fn test_command_tokens() {
        let service = ServiceDescriptor::new("redis", "cache").with_cmd("redis-server  --port 6380");
        assert_eq!(
            service.command_tokens().unwrap(),
            vec!["redis-server", "--port", "6380"]
        );

        let empty = ServiceDescriptor::new("nginx", "web");
        assert!(empty.command_tokens().is_none());
    }

    #[test]
    fn test_attach_network_keeps_explicit_network() {
        let network = NetworkRef {
            id: "net-1".to_string(),
            name: "test-net".to_string(),
        };

        let mut plain = ServiceDescriptor::new("nginx", "web");
        plain.attach_network(&network);
        assert_eq!(plain.network_id.as_deref(), Some("net-1"));
        assert_eq!(plain.network_name.as_deref(), Some("test-net"));

        let mut pinned = ServiceDescriptor::new("nginx", "web");
        pinned.network_id = Some("other".to_string());
        pinned.network_name = Some("other-net".to_string());
        pinned.attach_network(&network);
        assert_eq!(pinned.network_name.as_deref(), Some("other-net"));

        let mut by_id = ServiceDescriptor::new("nginx", "web");
        by_id.network_id = Some("abc123".to_string());
        by_id.attach_network(&network);
        assert_eq!(by_id.network_id.as_deref(), Some("abc123"));
        assert!(by_id.network_name.is_none());

        let mut by_name = ServiceDescriptor::new("nginx", "web");
        by_name.network_name = Some("other-net".to_string());
        by_name.attach_network(&network);
        assert!(by_name.network_id.is_none());
        assert_eq!(by_name.network_name.as_deref(), Some("other-net"));
    }
}
