//! Orchestration lifecycle manager.
//!
//! Drives one harness run:
//!
//! ```text
//! resolve network → (create → start → watch logs) per service → run test → teardown
//! ```
//!
//! Teardown runs exactly once per run, through a [`CompletionGate`], whether
//! it is triggered by normal completion, by a fatal error, or by an interrupt.
//! An interrupt cancels network resolution or the test command (killing it),
//! lets an in-flight container call finish, and bounds everything after it by
//! the configured kill timeout.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use transitioner::orchestrator::Orchestrator;
//! use transitioner::runtime::DockerClient;
//! use transitioner::test_runner::ProcessTestRunner;
//!
//! let orchestrator = Orchestrator::new(
//!     config,
//!     Arc::new(DockerClient::new()?),
//!     Arc::new(ProcessTestRunner::new()),
//! );
//! let report = orchestrator.run(transitioner::signal::shutdown_signal()).await?;
//! ```

mod report;
mod state;

pub use report::{RunOutcome, RunReport, TeardownReport};
pub use state::{CompletionGate, RunState, StateTracker};

use std::future::Future;
use std::sync::{Arc, OnceLock};

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::error::HarnessError;
use crate::network::NetworkResolver;
use crate::provisioner::Provisioner;
use crate::runtime::RuntimeGateway;
use crate::service::{ContainerHandle, ServiceDescriptor};
use crate::test_runner::{TestOutcome, TestRunner};
use crate::watcher::{LogSink, LogWatcher, StdoutSink};

/// Coordinates network resolution, provisioning, log watching, the test
/// command, and teardown for one run.
pub struct Orchestrator {
    config: RunConfig,
    gateway: Arc<dyn RuntimeGateway>,
    runner: Arc<dyn TestRunner>,
    sink: Arc<dyn LogSink>,
    resolver: NetworkResolver,
    provisioner: Provisioner,
    /// Every container created so far, started or not.
    handles: Mutex<Vec<ContainerHandle>>,
    state: StateTracker,
    gate: CompletionGate,
    /// Teardown deadline, set by the first interrupt.
    deadline: OnceLock<Instant>,
}

impl Orchestrator {
    /// Creates an orchestrator that writes container logs to stdout.
    pub fn new(
        config: RunConfig,
        gateway: Arc<dyn RuntimeGateway>,
        runner: Arc<dyn TestRunner>,
    ) -> Self {
        Self {
            resolver: NetworkResolver::new(gateway.clone()),
            provisioner: Provisioner::new(gateway.clone()),
            config,
            gateway,
            runner,
            sink: Arc::new(StdoutSink),
            handles: Mutex::new(Vec::new()),
            state: StateTracker::default(),
            gate: CompletionGate::new(),
            deadline: OnceLock::new(),
        }
    }

    /// Sets the sink for container log lines and test output.
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the current run state.
    pub fn state(&self) -> RunState {
        self.state.current()
    }

    /// Whether the run was interrupted.
    pub fn is_interrupted(&self) -> bool {
        self.state.is_interrupted()
    }

    /// Whether teardown has been claimed by either path.
    pub fn teardown_started(&self) -> bool {
        self.gate.has_fired()
    }

    /// Returns the containers created so far.
    pub async fn handles(&self) -> Vec<ContainerHandle> {
        self.handles.lock().await.clone()
    }

    /// Runs the harness until completion or until `interrupt` resolves.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error (network, provisioning, or test
    /// execution) after teardown has been attempted. An interrupt is not an
    /// error; it yields a report with [`RunOutcome::Interrupted`].
    pub async fn run<F>(&self, interrupt: F) -> Result<RunReport, HarnessError>
    where
        F: Future<Output = ()>,
    {
        // Fused so a completed interrupt is never polled again
        let interrupt = interrupt.fuse();
        tokio::pin!(interrupt);

        let result = self.execute(&mut interrupt).await;

        let teardown_report = match self.deadline.get() {
            Some(deadline) => Self::bounded_teardown(*deadline, self.teardown()).await,
            None => {
                let teardown = self.teardown();
                tokio::pin!(teardown);
                tokio::select! {
                    biased;
                    report = &mut teardown => report,
                    () = &mut interrupt => {
                        let deadline = self.interrupt();
                        warn!(timeout = ?self.config.kill_timeout(), "Interrupted during teardown");
                        Self::bounded_teardown(deadline, &mut teardown).await
                    }
                }
            }
        };

        let test = match result {
            Ok(outcome) => outcome,
            Err(e) if self.state.is_interrupted() => {
                warn!("Ignoring error from interrupted run: {}", e);
                None
            }
            Err(e) => {
                error!("{}", e);
                return Err(e);
            }
        };

        let outcome = if self.state.is_interrupted() {
            RunOutcome::Interrupted
        } else {
            RunOutcome::Passed
        };

        Ok(self.report(outcome, teardown_report, test).await)
    }

    /// The main sequence, up to and including the test command.
    ///
    /// Returns `Ok(None)` once interrupted. Only network resolution and the
    /// test command are cancelled by the interrupt; a container call already
    /// in flight runs to completion (bounded by the kill deadline) so the
    /// container it creates is recorded for teardown.
    async fn execute<I>(&self, interrupt: &mut I) -> Result<Option<TestOutcome>, HarnessError>
    where
        I: Future<Output = ()> + Unpin,
    {
        let network = tokio::select! {
            biased;
            () = &mut *interrupt => {
                self.interrupt();
                info!("Interrupted while resolving the network");
                return Ok(None);
            }
            network = self.resolver.resolve(&self.config.network) => {
                network.map_err(|source| HarnessError::RuntimeUnavailable {
                    network: self.config.network.clone(),
                    source,
                })?
            }
        };
        self.state.transition(RunState::NetworkReady);

        self.state.transition(RunState::Provisioning);
        for service in &self.config.services {
            let mut descriptor = service.clone();
            descriptor.attach_network(&network);

            let provision = self.provision_service(descriptor);
            tokio::pin!(provision);
            tokio::select! {
                biased;
                result = &mut provision => result?,
                () = &mut *interrupt => {
                    let deadline = self.interrupt();
                    warn!(hostname = %service.hostname, "Interrupted while provisioning, waiting for the runtime call");
                    match tokio::time::timeout_at(deadline, &mut provision).await {
                        Ok(result) => result?,
                        Err(_) => warn!(
                            hostname = %service.hostname,
                            "Runtime call did not return before the deadline"
                        ),
                    }
                }
            }

            if self.state.is_interrupted() {
                return Ok(None);
            }
        }
        self.state.transition(RunState::Running);
        info!(
            network = %network.name,
            containers = self.config.services.len(),
            "All services started"
        );

        self.state.transition(RunState::TestExecuting);
        // Dropping the runner future kills a still-running test command
        let outcome = tokio::select! {
            biased;
            () = &mut *interrupt => {
                self.interrupt();
                info!("Interrupted, stopping test command");
                return Ok(None);
            }
            outcome = self.runner.run(&self.config.test) => outcome?,
        };
        for line in outcome.output.lines() {
            self.sink.write_line(line);
        }

        if !outcome.is_success() {
            let reason = match outcome.exit_code {
                Some(code) => format!("exited with code {code}"),
                None => "terminated by signal".to_string(),
            };
            return Err(HarnessError::TestExecutionFailure {
                command: self.config.test.cmd.clone(),
                reason,
            });
        }

        info!(duration = ?outcome.duration, "Test command passed");
        Ok(Some(outcome))
    }

    /// Creates one container, records its handle, then starts it and
    /// attaches a log watcher. The start is skipped once interrupted.
    async fn provision_service(&self, descriptor: ServiceDescriptor) -> Result<(), HarnessError> {
        let handle = self.provisioner.provision(&descriptor).await?;
        self.handles.lock().await.push(handle.clone());

        if self.state.is_interrupted() {
            return Ok(());
        }

        self.provisioner.start(&handle).await?;

        // Detached: the watcher ends when the container stops
        LogWatcher::spawn(self.gateway.clone(), &handle, self.sink.clone());
        Ok(())
    }

    /// Records the interrupt and returns the teardown deadline.
    ///
    /// The deadline is fixed by the first interrupt.
    fn interrupt(&self) -> Instant {
        self.state.mark_interrupted();
        *self
            .deadline
            .get_or_init(|| Instant::now() + self.config.kill_timeout())
    }

    /// Awaits `teardown` until `deadline`.
    async fn bounded_teardown<T>(deadline: Instant, teardown: T) -> Option<TeardownReport>
    where
        T: Future<Output = Option<TeardownReport>>,
    {
        match tokio::time::timeout_at(deadline, teardown).await {
            Ok(report) => report,
            Err(_) => {
                warn!("Teardown did not finish before the deadline");
                Some(TeardownReport::timed_out())
            }
        }
    }

    /// Stops and removes every created container, at most once per run.
    ///
    /// Returns `None` if teardown was already claimed.
    async fn teardown(&self) -> Option<TeardownReport> {
        if !self.gate.try_fire() {
            return None;
        }
        self.state.transition(RunState::TearingDown);

        let handles = self.handles().await;
        let report = if !self.config.cleanup {
            info!(containers = handles.len(), "Cleanup disabled, leaving containers in place");
            TeardownReport::cleanup_disabled(handles.len())
        } else {
            let containers = join_all(
                handles
                    .iter()
                    .map(|handle| self.provisioner.stop_and_remove(handle)),
            )
            .await;
            TeardownReport {
                containers,
                ..Default::default()
            }
        };

        let failed = report.failed();
        if !failed.is_empty() {
            warn!(containers = ?failed, "Teardown incomplete");
        }

        self.state.transition(RunState::Done);
        Some(report)
    }

    async fn report(
        &self,
        outcome: RunOutcome,
        teardown: Option<TeardownReport>,
        test: Option<TestOutcome>,
    ) -> RunReport {
        let handles = self.handles().await;
        let skipped_ports = handles
            .iter()
            .flat_map(|h| {
                h.skipped_ports()
                    .iter()
                    .map(move |entry| (h.hostname().to_string(), entry.clone()))
            })
            .collect();

        RunReport {
            outcome,
            containers: handles.len(),
            skipped_ports,
            teardown,
            test,
        }
    }
}
