//! Test workload execution.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::TestConfig;
use crate::error::HarnessError;

/// Result of running the test command.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    /// Exit code, `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Combined stdout followed by stderr.
    pub output: String,
    pub duration: Duration,
}

impl TestOutcome {
    pub fn new(exit_code: Option<i32>, output: impl Into<String>, duration: Duration) -> Self {
        Self {
            exit_code,
            output: output.into(),
            duration,
        }
    }

    /// Checks if the command exited with code 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Executes the configured test command.
#[async_trait]
pub trait TestRunner: Send + Sync {
    /// Runs the command to completion.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::TestExecutionFailure` if the command cannot be
    /// launched. A non-zero exit is reported through the outcome.
    async fn run(&self, test: &TestConfig) -> Result<TestOutcome, HarnessError>;
}

/// Runs the test command as a child process, without a shell.
///
/// The command line is split on whitespace. The working directory is set on
/// the child only. The child is killed if the run future is dropped.
#[derive(Debug, Default, Clone)]
pub struct ProcessTestRunner;

impl ProcessTestRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TestRunner for ProcessTestRunner {
    async fn run(&self, test: &TestConfig) -> Result<TestOutcome, HarnessError> {
        let mut tokens = test.cmd.split_whitespace();
        let program = tokens.next().ok_or_else(|| HarnessError::TestExecutionFailure {
            command: test.cmd.clone(),
            reason: "empty command".to_string(),
        })?;

        let mut command = Command::new(program);
        command.args(tokens).kill_on_drop(true);
        if let Some(dir) = &test.dir {
            command.current_dir(dir);
        }

        info!(command = %test.cmd, "Running test command");
        let start = Instant::now();

        let output = command
            .output()
            .await
            .map_err(|e| HarnessError::TestExecutionFailure {
                command: test.cmd.clone(),
                reason: format!("failed to launch: {e}"),
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        let duration = start.elapsed();
        debug!(command = %test.cmd, ?duration, code = ?output.status.code(), "Test command exited");

        Ok(TestOutcome::new(output.status.code(), combined, duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(cmd: &str) -> TestConfig {
        TestConfig {
            cmd: cmd.to_string(),
            dir: None,
        }
    }

    #[test]
    fn test_outcome_success() {
        assert!(TestOutcome::new(Some(0), "", Duration::ZERO).is_success());
        assert!(!TestOutcome::new(Some(1), "", Duration::ZERO).is_success());
        assert!(!TestOutcome::new(None, "", Duration::ZERO).is_success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_true_and_false() {
        let runner = ProcessTestRunner::new();

        let passed = runner.run(&test_config("true")).await.unwrap();
        assert!(passed.is_success());

        let failed = runner.run(&test_config("false")).await.unwrap();
        assert!(!failed.is_success());
        assert_eq!(failed.exit_code, Some(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_output_in_working_dir() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("marker.txt"), "").unwrap();

        let runner = ProcessTestRunner::new();
        let config = TestConfig {
            cmd: "ls".to_string(),
            dir: Some(temp_dir.path().to_path_buf()),
        };

        let outcome = runner.run(&config).await.unwrap();
        assert!(outcome.is_success());
        assert!(outcome.output.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_missing_program_is_execution_failure() {
        let runner = ProcessTestRunner::new();
        let err = runner
            .run(&test_config("definitely-not-a-real-binary-4821"))
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::TestExecutionFailure { .. }));
    }

    #[tokio::test]
    async fn test_empty_command_is_execution_failure() {
        let runner = ProcessTestRunner::new();
        let err = runner.run(&test_config("   ")).await.unwrap_err();
        assert!(err.to_string().contains("empty command"));
    }
}
