//! Network resolution.
//!
//! Ensures a named network exists. An existing network with the same name is
//! reused; otherwise a bridged, attachable, IPv4-only network is created.
//! Resolved names are memoized, so at most one network is created per name
//! for the lifetime of a resolver.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::error::RuntimeError;
use crate::runtime::{NetworkSpec, RuntimeGateway};
use crate::service::NetworkRef;

/// Resolves network names to identifiers, creating networks on demand.
pub struct NetworkResolver {
    gateway: Arc<dyn RuntimeGateway>,
    resolved: Mutex<HashMap<String, NetworkRef>>,
}

impl NetworkResolver {
    pub fn new(gateway: Arc<dyn RuntimeGateway>) -> Self {
        Self {
            gateway,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the network named `name`, creating it if it does not exist.
    ///
    /// The lock is held across the runtime calls so concurrent resolutions
    /// of the same name cannot both create it.
    ///
    /// # Errors
    ///
    /// Returns the gateway error if listing or creation fails. No retry.
    pub async fn resolve(&self, name: &str) -> Result<NetworkRef, RuntimeError> {
        let mut resolved = self.resolved.lock().await;
        if let Some(network) = resolved.get(name) {
            return Ok(network.clone());
        }

        let network = self.lookup_or_create(name).await?;
        resolved.insert(name.to_string(), network.clone());
        Ok(network)
    }

    async fn lookup_or_create(&self, name: &str) -> Result<NetworkRef, RuntimeError> {
        let existing = self.gateway.list_networks().await?;
        if let Some(network) = existing.into_iter().find(|n| n.name == name) {
            info!(network = %name, id = %network.id, "Using existing network");
            return Ok(NetworkRef {
                id: network.id,
                name: network.name,
            });
        }

        let id = self.gateway.create_network(&NetworkSpec::bridge(name)).await?;
        info!(network = %name, id = %id, "Created network");

        Ok(NetworkRef {
            id,
            name: name.to_string(),
        })
    }
}
