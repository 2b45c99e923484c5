//! CLI command definitions for transitioner.
//!
//! `run` provisions the configured services, runs the test command against
//! them and tears everything down. `validate` checks a configuration file
//! without contacting the container runtime.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::orchestrator::{Orchestrator, RunOutcome};
use crate::runtime::DockerClient;
use crate::signal::shutdown_signal;
use crate::test_runner::ProcessTestRunner;

/// Ephemeral multi-container test harness.
#[derive(Parser)]
#[command(name = "transitioner")]
#[command(about = "Spin up containers, run a test command against them, tear them down")]
#[command(version)]
#[command(
    long_about = "transitioner creates a shared network and a set of service containers, streams their logs, runs a test command, and always removes the containers afterwards (including on Ctrl-C).\n\nExample usage:\n  transitioner run --config ./transitioner.yaml"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Provision services, run the test command, and tear down.
    Run(RunArgs),

    /// Check a configuration file, including port bindings.
    #[command(alias = "check")]
    Validate(ValidateArgs),
}

/// Arguments for `transitioner run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Configuration file. Defaults to transitioner.yaml in
    /// ~/.config/transitioner or the current directory.
    #[arg(short, long, env = "TRANSITIONER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Leave containers in place after the run.
    #[arg(long)]
    pub no_cleanup: bool,

    /// Override the shutdown timeout (seconds).
    #[arg(long)]
    pub kill_timeout: Option<u64>,
}

/// Arguments for `transitioner validate`.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Configuration file.
    #[arg(short, long, env = "TRANSITIONER_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Parses command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Runs the selected command.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Run(args) => run_harness_command(args).await,
        Commands::Validate(args) => run_validate_command(args),
    }
}

/// Applies command-line overrides to a loaded configuration.
fn apply_overrides(mut config: RunConfig, args: &RunArgs) -> RunConfig {
    if args.no_cleanup {
        config.cleanup = false;
    }
    if let Some(secs) = args.kill_timeout {
        config.kill_timeout = secs;
    }
    config
}

async fn run_harness_command(args: RunArgs) -> anyhow::Result<ExitCode> {
    let config = RunConfig::load(args.config.as_deref())?;
    let config = apply_overrides(config, &args);

    info!(
        network = %config.network,
        services = config.services.len(),
        cleanup = config.cleanup,
        "Starting harness"
    );

    let gateway = Arc::new(DockerClient::new()?.with_stop_grace(config.stop_grace()));
    let orchestrator = Orchestrator::new(config, gateway, Arc::new(ProcessTestRunner::new()));

    let report = orchestrator.run(shutdown_signal()).await?;

    for (hostname, entry) in &report.skipped_ports {
        warn!(hostname = %hostname, entry = %entry, "Port binding was skipped");
    }
    if let Some(teardown) = &report.teardown {
        if teardown.timed_out {
            warn!("Teardown timed out; some containers may still exist");
        }
    }

    match report.outcome {
        RunOutcome::Passed => info!(containers = report.containers, "Run passed"),
        RunOutcome::Interrupted => warn!("Run interrupted"),
    }

    Ok(ExitCode::from(report.outcome.exit_code()))
}

fn run_validate_command(args: ValidateArgs) -> anyhow::Result<ExitCode> {
    let config = RunConfig::load(args.config.as_deref())?;
    let warnings = config.port_warnings();

    for (hostname, err) in &warnings {
        warn!(hostname = %hostname, "{}", err);
    }

    if warnings.is_empty() {
        info!(
            network = %config.network,
            services = config.services.len(),
            "Configuration is valid"
        );
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(count = warnings.len(), "Configuration has malformed port bindings");
        Ok(ExitCode::FAILURE)
    }
}
