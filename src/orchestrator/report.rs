//! Run and teardown reports.

use crate::provisioner::ContainerTeardown;
use crate::test_runner::TestOutcome;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The test command succeeded.
    Passed,
    /// An interrupt signal ended the run.
    Interrupted,
}

impl RunOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::Passed => 0,
            RunOutcome::Interrupted => 130,
        }
    }
}

/// Result of the teardown pass.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Per-container results. Empty when cleanup is disabled.
    pub containers: Vec<ContainerTeardown>,
    /// Containers left in place because cleanup is disabled.
    pub left_running: usize,
    /// Whether the teardown deadline expired before every call returned.
    pub timed_out: bool,
}

impl TeardownReport {
    pub fn cleanup_disabled(left_running: usize) -> Self {
        Self {
            left_running,
            ..Default::default()
        }
    }

    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Default::default()
        }
    }

    /// Hostnames whose stop or remove call failed.
    pub fn failed(&self) -> Vec<&str> {
        self.containers
            .iter()
            .filter(|c| !c.is_clean())
            .map(|c| c.hostname.as_str())
            .collect()
    }

    /// Number of containers that were both stopped and removed.
    pub fn removed(&self) -> usize {
        self.containers
            .iter()
            .filter(|c| c.stopped && c.removed)
            .count()
    }
}

/// Summary of a completed run.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Containers created during the run.
    pub containers: usize,
    /// Malformed port entries skipped during provisioning, as `(hostname, entry)`.
    pub skipped_ports: Vec<(String, String)>,
    /// `None` if another path already performed teardown.
    pub teardown: Option<TeardownReport>,
    /// `None` if the run was interrupted before the test command finished.
    pub test: Option<TestOutcome>,
}
