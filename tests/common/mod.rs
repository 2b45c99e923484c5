//! Shared fakes for orchestration tests.
//!
//! `RecordingGateway` keeps networks and containers in memory and records
//! every container call as `"<op>:<hostname>"`. `ScriptedRunner` returns a
//! fixed outcome after an optional delay.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use transitioner::config::TestConfig;
use transitioner::runtime::{
    ContainerSpec, LogOptions, LogStream, NetworkSpec, NetworkSummary, RuntimeGateway,
};
use transitioner::service::ServiceDescriptor;
use transitioner::test_runner::{TestOutcome, TestRunner};
use transitioner::{HarnessError, RuntimeError};

#[derive(Default)]
pub struct RecordingGateway {
    networks: Mutex<Vec<NetworkSummary>>,
    created_networks: Mutex<Vec<NetworkSpec>>,
    containers: Mutex<HashMap<String, ContainerSpec>>,
    events: Mutex<Vec<String>>,
    next_id: AtomicUsize,
    logs: Mutex<HashMap<String, Vec<Result<String, String>>>>,
    fail_start: HashSet<String>,
    fail_stop: HashSet<String>,
    stop_delay: Option<Duration>,
    create_delay: Option<Duration>,
    unreachable: bool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runtime cannot be reached at all.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    pub fn with_existing_network(self, id: &str, name: &str) -> Self {
        self.networks.lock().unwrap().push(NetworkSummary {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn failing_start(mut self, hostname: &str) -> Self {
        self.fail_start.insert(hostname.to_string());
        self
    }

    pub fn failing_stop(mut self, hostname: &str) -> Self {
        self.fail_stop.insert(hostname.to_string());
        self
    }

    pub fn with_stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = Some(delay);
        self
    }

    /// The container exists on the runtime before a delayed create call returns.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    /// Log chunks served for a hostname. `Err` entries become stream errors.
    pub fn with_logs(self, hostname: &str, chunks: Vec<Result<String, String>>) -> Self {
        self.logs
            .lock()
            .unwrap()
            .insert(hostname.to_string(), chunks);
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == event).count()
    }

    /// Hostnames of containers that were created and not removed.
    pub fn live_containers(&self) -> Vec<String> {
        let events = self.events();
        events
            .iter()
            .filter_map(|e| e.strip_prefix("create:"))
            .filter(|host| !events.contains(&format!("remove:{host}")))
            .map(str::to_string)
            .collect()
    }

    pub fn created_networks(&self) -> Vec<NetworkSpec> {
        self.created_networks.lock().unwrap().clone()
    }

    pub fn container_spec(&self, hostname: &str) -> Option<ContainerSpec> {
        self.containers
            .lock()
            .unwrap()
            .values()
            .find(|spec| spec.hostname == hostname)
            .cloned()
    }

    fn hostname_of(&self, id: &str) -> Result<String, RuntimeError> {
        self.containers
            .lock()
            .unwrap()
            .get(id)
            .map(|spec| spec.hostname.clone())
            .ok_or_else(|| RuntimeError::request_failed("lookup", format!("no such container: {id}")))
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn check_reachable(&self) -> Result<(), RuntimeError> {
        if self.unreachable {
            Err(RuntimeError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RuntimeGateway for RecordingGateway {
    async fn list_networks(&self) -> Result<Vec<NetworkSummary>, RuntimeError> {
        self.check_reachable()?;
        Ok(self.networks.lock().unwrap().clone())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<String, RuntimeError> {
        self.check_reachable()?;
        let id = format!("net-{}", self.created_networks.lock().unwrap().len() + 1);
        self.networks.lock().unwrap().push(NetworkSummary {
            id: id.clone(),
            name: spec.name.clone(),
        });
        self.created_networks.lock().unwrap().push(spec.clone());
        Ok(id)
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        self.check_reachable()?;
        let id = format!("container-{:04}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.containers
            .lock()
            .unwrap()
            .insert(id.clone(), spec.clone());
        self.record(format!("create:{}", spec.hostname));
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        let hostname = self.hostname_of(id)?;
        self.record(format!("start:{hostname}"));
        if self.fail_start.contains(&hostname) {
            return Err(RuntimeError::request_failed(
                "start container",
                "port is already allocated",
            ));
        }
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        let hostname = self.hostname_of(id)?;
        if let Some(delay) = self.stop_delay {
            tokio::time::sleep(delay).await;
        }
        self.record(format!("stop:{hostname}"));
        if self.fail_stop.contains(&hostname) {
            return Err(RuntimeError::request_failed("stop container", "container is dead"));
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        let hostname = self.hostname_of(id)?;
        self.record(format!("remove:{hostname}"));
        Ok(())
    }

    async fn stream_logs(&self, id: &str, _options: LogOptions) -> Result<LogStream, RuntimeError> {
        let hostname = self.hostname_of(id)?;
        let chunks = self
            .logs
            .lock()
            .unwrap()
            .get(&hostname)
            .cloned()
            .unwrap_or_default();

        let items = chunks
            .into_iter()
            .map(|chunk| chunk.map_err(|reason| RuntimeError::request_failed("read logs", reason)));
        Ok(futures::stream::iter(items).boxed())
    }
}

/// Test runner returning a fixed outcome.
pub struct ScriptedRunner {
    exit_code: i32,
    output: String,
    delay: Duration,
    calls: AtomicUsize,
    finished: AtomicUsize,
}

impl ScriptedRunner {
    pub fn passing() -> Self {
        Self::exiting(0, "ok\n")
    }

    pub fn failing() -> Self {
        Self::exiting(1, "1 test failed\n")
    }

    pub fn exiting(exit_code: i32, output: &str) -> Self {
        Self {
            exit_code,
            output: output.to_string(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TestRunner for ScriptedRunner {
    async fn run(&self, _test: &TestConfig) -> Result<TestOutcome, HarnessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(TestOutcome::new(Some(self.exit_code), self.output.clone(), self.delay))
    }
}

/// `nginx` service published on `host_port:80`.
pub fn nginx(hostname: &str, host_port: u16) -> ServiceDescriptor {
    ServiceDescriptor::new("nginx", hostname).with_port(format!("{host_port}:80"))
}
