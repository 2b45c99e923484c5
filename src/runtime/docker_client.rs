//! Docker API wrapper using the bollard crate.
//!
//! Implements [`RuntimeGateway`] against the local Docker daemon.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::models::{HostConfig, Ipam, PortBinding};
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use bollard::Docker;
use futures::StreamExt;

use crate::error::RuntimeError;
use crate::runtime::{
    ContainerSpec, LogOptions, LogStream, NetworkSpec, NetworkSummary, RuntimeGateway,
};

/// Default wait after SIGTERM before the daemon kills a container on stop.
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Docker client wrapper for network and container operations.
#[derive(Clone)]
pub struct DockerClient {
    docker: Docker,
    /// Seconds passed to the daemon as the stop timeout.
    stop_grace_secs: i64,
}

impl DockerClient {
    /// Creates a new Docker client connecting to the local Docker daemon.
    ///
    /// Honors `DOCKER_HOST`. The connection is lazy; an unreachable daemon
    /// surfaces on the first call.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Unavailable` if the client cannot be configured.
    pub fn new() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Unavailable(format!("Failed to connect: {e}")))?;

        Ok(Self::from_docker(docker))
    }

    /// Creates a new Docker client from an existing bollard Docker instance.
    pub fn from_docker(docker: Docker) -> Self {
        Self {
            docker,
            stop_grace_secs: grace_seconds(DEFAULT_STOP_GRACE),
        }
    }

    /// Sets how long a stopping container may take to exit before it is killed.
    ///
    /// Keep this below the run's kill timeout, otherwise one container that
    /// ignores SIGTERM uses up the interrupt deadline before it is removed.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace_secs = grace_seconds(grace);
        self
    }

    /// Builds the bollard container configuration for a spec.
    fn container_config(spec: &ContainerSpec) -> Config<String> {
        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .exposed_ports
            .iter()
            .map(|port| (port.clone(), HashMap::new()))
            .collect();

        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
            .port_bindings
            .iter()
            .map(|binding| {
                (
                    binding.container_port.clone(),
                    Some(vec![PortBinding {
                        host_ip: None,
                        host_port: Some(binding.host_port.clone()),
                    }]),
                )
            })
            .collect();

        let host_config = HostConfig {
            dns: Some(spec.dns.clone()),
            dns_search: Some(spec.dns_search.clone()),
            publish_all_ports: Some(spec.publish_all_ports),
            network_mode: spec.network_mode.clone(),
            port_bindings: Some(port_bindings),
            ..Default::default()
        };

        Config {
            image: Some(spec.image.clone()),
            cmd: spec.cmd.clone(),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            hostname: Some(spec.hostname.clone()),
            domainname: Some(spec.domainname.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        }
    }
}

/// Whole seconds for the daemon's stop timeout.
fn grace_seconds(grace: Duration) -> i64 {
    i64::try_from(grace.as_secs()).unwrap_or(i64::MAX)
}

/// Maps a bollard error: a daemon that answered is a failed request,
/// anything else means the daemon could not be reached.
fn map_error(operation: &str, err: bollard::errors::Error) -> RuntimeError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => RuntimeError::request_failed(operation, format!("{message} (status {status_code})")),
        other => RuntimeError::Unavailable(format!("{operation}: {other}")),
    }
}

#[async_trait]
impl RuntimeGateway for DockerClient {
    async fn list_networks(&self) -> Result<Vec<NetworkSummary>, RuntimeError> {
        let networks = self
            .docker
            .list_networks(None::<ListNetworksOptions<String>>)
            .await
            .map_err(|e| map_error("list networks", e))?;

        Ok(networks
            .into_iter()
            .filter_map(|n| match (n.id, n.name) {
                (Some(id), Some(name)) => Some(NetworkSummary { id, name }),
                _ => None,
            })
            .collect())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<String, RuntimeError> {
        let options = CreateNetworkOptions {
            name: spec.name.clone(),
            check_duplicate: true,
            driver: spec.driver.clone(),
            internal: spec.internal,
            attachable: spec.attachable,
            enable_ipv6: spec.enable_ipv6,
            ipam: Ipam {
                driver: Some(spec.ipam_driver.clone()),
                ..Default::default()
            },
            ..Default::default()
        };

        let response = self
            .docker
            .create_network(options)
            .await
            .map_err(|e| map_error("create network", e))?;

        response
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RuntimeError::request_failed("create network", "no ID returned"))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), Self::container_config(spec))
            .await
            .map_err(|e| map_error("create container", e))?;

        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, "{}", warning);
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_error("start container", e))
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        let options = StopContainerOptions {
            t: self.stop_grace_secs,
        };

        self.docker
            .stop_container(id, Some(options))
            .await
            .map_err(|e| map_error("stop container", e))
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: false,
            v: true,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| map_error("remove container", e))
    }

    async fn stream_logs(&self, id: &str, options: LogOptions) -> Result<LogStream, RuntimeError> {
        let docker = self.docker.clone();
        let id = id.to_string();
        let logs_options = LogsOptions::<String> {
            follow: options.follow,
            stdout: true,
            stderr: true,
            timestamps: options.timestamps,
            tail: options
                .tail
                .map(|n| n.to_string())
                .unwrap_or_else(|| "all".to_string()),
            ..Default::default()
        };

        let stream = async_stream::stream! {
            let mut logs = docker.logs(&id, Some(logs_options));
            while let Some(chunk) = logs.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message })
                    | Ok(LogOutput::StdErr { message })
                    | Ok(LogOutput::Console { message }) => {
                        yield Ok(String::from_utf8_lossy(&message).into_owned());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        yield Err(map_error("read logs", e));
                        break;
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::HostBinding;

    fn sample_spec() -> ContainerSpec {
        ContainerSpec {
            name: "web".to_string(),
            image: "nginx".to_string(),
            cmd: None,
            env: vec!["MODE=test".to_string()],
            hostname: "web".to_string(),
            domainname: "web".to_string(),
            exposed_ports: vec!["80/tcp".to_string()],
            port_bindings: vec![HostBinding {
                container_port: "80/tcp".to_string(),
                host_port: "8081".to_string(),
            }],
            dns: vec!["8.8.8.8".to_string()],
            dns_search: vec!["8.8.8.8".to_string()],
            network_mode: Some("test-net".to_string()),
            publish_all_ports: false,
        }
    }

    #[test]
    fn test_container_config_translation() {
        let config = DockerClient::container_config(&sample_spec());

        assert_eq!(config.image.as_deref(), Some("nginx"));
        assert_eq!(config.hostname.as_deref(), Some("web"));
        assert_eq!(config.domainname.as_deref(), Some("web"));
        assert!(config.cmd.is_none());
        assert!(config.exposed_ports.unwrap().contains_key("80/tcp"));

        let host_config = config.host_config.unwrap();
        assert_eq!(host_config.network_mode.as_deref(), Some("test-net"));
        assert_eq!(host_config.publish_all_ports, Some(false));

        let bindings = host_config.port_bindings.unwrap();
        let binding = bindings["80/tcp"].as_ref().unwrap();
        assert_eq!(binding[0].host_port.as_deref(), Some("8081"));
    }

    #[test]
    fn test_empty_env_is_omitted() {
        let mut spec = sample_spec();
        spec.env.clear();
        assert!(DockerClient::container_config(&spec).env.is_none());
    }

    #[test]
    fn test_grace_seconds() {
        assert_eq!(grace_seconds(DEFAULT_STOP_GRACE), 10);
        assert_eq!(grace_seconds(Duration::from_millis(2500)), 2);
        assert_eq!(grace_seconds(Duration::ZERO), 0);
    }

    #[test]
    fn test_server_errors_are_request_failures() {
        let err = map_error(
            "start container",
            bollard::errors::Error::DockerResponseServerError {
                status_code: 500,
                message: "port is already allocated".to_string(),
            },
        );
        assert!(matches!(err, RuntimeError::RequestFailed { .. }));
        assert!(err.to_string().contains("port is already allocated"));
    }
}
