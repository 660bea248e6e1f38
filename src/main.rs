//! vecbench - Container-isolated vector database benchmarking tool

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vecbench_backends::{CommandGpuMonitor, DockerBackend, HttpConfig, HttpHealthProbe, QdrantClient};
use vecbench_core::{
    BenchError, CancellationFlag, InterruptCoordinator, InterruptState, OrchestratorBuilder,
    RunConfig, RunStatus,
};

mod cli;

use cli::{Cli, Commands, LogFormat, RunArgs};

/// Exit code for errors outside the benchmark run itself
const EXIT_SETUP_FAILURE: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Validate(args) => validate(&args),
        Commands::Run(args) => match run(&args).await {
            Ok(code) => code,
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "Benchmark setup failed");
                ExitCode::from(EXIT_SETUP_FAILURE)
            }
        },
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{default_level},hyper=warn,reqwest=warn")));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(verbose);

    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
}

fn validate(args: &RunArgs) -> ExitCode {
    let config = args.to_config();
    if let Err(e) = config.validate() {
        let err = BenchError::from(e);
        tracing::error!(error = %err, "Invalid configuration");
        return ExitCode::from(err.exit_code());
    }
    match serde_json::to_string_pretty(&config) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize configuration");
            ExitCode::from(EXIT_SETUP_FAILURE)
        }
    }
}

fn check_privileges(args: &RunArgs) -> Result<(), BenchError> {
    if args.allow_non_root || nix::unistd::geteuid().is_root() {
        return Ok(());
    }
    Err(BenchError::privilege(
        "this benchmark must be run as root (use --allow-non-root to skip this check)",
    ))
}

async fn run(args: &RunArgs) -> Result<ExitCode> {
    let config = args.to_config();
    if let Err(e) = config.validate() {
        let err = BenchError::from(e);
        tracing::error!(error = %err, "Invalid configuration");
        return Ok(ExitCode::from(err.exit_code()));
    }
    if let Err(err) = check_privileges(args) {
        tracing::error!(error = %err, "Insufficient privileges");
        return Ok(ExitCode::from(err.exit_code()));
    }

    let coordinator = InterruptCoordinator::install(CancellationFlag::new());
    let orchestrator = build_orchestrator(config, coordinator.flag().clone(), !args.no_progress)?;

    let result = orchestrator.run().await;
    if coordinator.finish() == InterruptState::Cancelled {
        tracing::info!("Cleanup after interrupt complete");
    }

    match result {
        Ok(outcome) => {
            if outcome.status == RunStatus::Cancelled {
                tracing::warn!("Benchmark cancelled before completion");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => Ok(ExitCode::from(err.exit_code())),
    }
}

fn build_orchestrator(
    config: RunConfig,
    cancel: CancellationFlag,
    progress: bool,
) -> Result<vecbench_core::Orchestrator> {
    let backend = DockerBackend::new();
    if !backend.is_available() {
        tracing::warn!("docker binary not found on PATH");
    }

    let http = HttpConfig::default().with_request_timeout(config.request_timeout);
    let url = config.service_url();
    let client = QdrantClient::new(&url, &http).context("Failed to build service client")?;
    let probe = HttpHealthProbe::new(&url, &http).context("Failed to build health probe")?;

    let orchestrator = OrchestratorBuilder::new()
        .config(config)
        .backend(Arc::new(backend))
        .client(Arc::new(client))
        .probe(Arc::new(probe))
        .gpu(Arc::new(CommandGpuMonitor::new()))
        .cancellation(cancel)
        .progress(progress)
        .build()?;
    Ok(orchestrator)
}
