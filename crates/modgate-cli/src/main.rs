//! CLI entry point for modgate.
//!
//! This binary provides the `modgate` command with subcommands for running a
//! gateway, a worker host, a one-shot worker process, and the dispatch
//! client.
//!
//! `worker exec` runs without an async runtime: the sandbox drives the guest
//! synchronously and writes straight to stdout. Every other subcommand runs
//! on a multi-threaded tokio runtime.

mod cli;
mod config;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use modgate_client::DispatchClient;
use modgate_core::{OperationKind, Platform};
use modgate_gateway::GatewayServer;
use modgate_worker::{WorkerCommand, WorkerHost};

use crate::cli::{Cli, Commands, WorkerAction};
use crate::config::ModgateConfig;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Worker {
            action: WorkerAction::Exec { kind },
        } => {
            init_tracing("warn");
            let config = ModgateConfig::load(cli.config.as_deref())?;
            return cmd_worker_exec(kind, &config);
        }
        Commands::Gateway { bind } => ServiceCommand::Gateway { bind },
        Commands::Worker {
            action: WorkerAction::Serve { kind, bind },
        } => ServiceCommand::WorkerServe { kind, bind },
        Commands::Dispatch {
            platform,
            asm,
            backends,
            file,
        } => ServiceCommand::Dispatch {
            platform,
            asm,
            backends,
            file,
        },
        Commands::Platforms { backends } => ServiceCommand::Platforms { backends },
    };

    init_tracing("info");
    let config = ModgateConfig::load(cli.config.as_deref())?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(run_service(command, config, cli.config))
}

/// Subcommands that run on the tokio runtime.
enum ServiceCommand {
    Gateway {
        bind: Option<String>,
    },
    WorkerServe {
        kind: OperationKind,
        bind: Option<String>,
    },
    Dispatch {
        platform: Platform,
        asm: bool,
        backends: Vec<String>,
        file: PathBuf,
    },
    Platforms {
        backends: Vec<String>,
    },
}

async fn run_service(command: ServiceCommand, config: ModgateConfig, config_path: Option<PathBuf>) -> Result<()> {
    match command {
        ServiceCommand::Gateway { bind } => cmd_gateway(config, bind).await,
        ServiceCommand::WorkerServe { kind, bind } => cmd_worker_serve(config, config_path, kind, bind).await,
        ServiceCommand::Dispatch {
            platform,
            asm,
            backends,
            file,
        } => cmd_dispatch(config, platform, asm, backends, file).await,
        ServiceCommand::Platforms { backends } => cmd_platforms(config, backends).await,
    }
}

/// Logs go to stderr; stdout carries command output and, for worker
/// processes, the response to the gateway.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Subcommand: gateway
// ---------------------------------------------------------------------------

async fn cmd_gateway(mut config: ModgateConfig, bind: Option<String>) -> Result<()> {
    if let Some(bind) = bind {
        config.gateway.bind = bind;
    }
    let server = GatewayServer::new(config.gateway).context("invalid gateway configuration")?;
    server.start().await.context("gateway stopped")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: worker
// ---------------------------------------------------------------------------

async fn cmd_worker_serve(
    config: ModgateConfig,
    config_path: Option<PathBuf>,
    kind: OperationKind,
    bind: Option<String>,
) -> Result<()> {
    let exe = std::env::current_exe().context("failed to locate the modgate executable")?;
    let mut command = WorkerCommand::new(exe)
        .arg("worker")
        .arg("exec")
        .arg("--kind")
        .arg(kind.path_segment());
    if let Some(path) = config_path {
        command = command.arg("--config").arg(path);
    }

    let sandbox = config.worker.sandbox.clone();
    let addr = bind.unwrap_or_else(|| config.worker.bind_for(kind).to_owned());
    let host = WorkerHost::new(kind, command, Duration::from_millis(sandbox.max_execution_ms));

    host.bind_and_serve(&addr)
        .await
        .with_context(|| format!("worker host on {addr} stopped"))?;
    Ok(())
}

/// A returned error ends the process with a failure status, which makes the
/// worker host reset the connection.
fn cmd_worker_exec(kind: OperationKind, config: &ModgateConfig) -> Result<()> {
    modgate_worker::run_worker(kind, &config.worker.sandbox).with_context(|| format!("{kind} worker failed"))
}

// ---------------------------------------------------------------------------
// Subcommands: dispatch, platforms
// ---------------------------------------------------------------------------

fn client_for(mut config: ModgateConfig, backends: Vec<String>) -> Result<DispatchClient> {
    if !backends.is_empty() {
        config.client.backends = backends;
    }
    anyhow::ensure!(
        !config.client.backends.is_empty(),
        "no gateways configured; pass --backend or set {}",
        config::ENV_BACKENDS
    );
    Ok(DispatchClient::from_config(&config.client)?)
}

async fn cmd_dispatch(
    config: ModgateConfig,
    platform: Platform,
    asm: bool,
    backends: Vec<String>,
    file: PathBuf,
) -> Result<()> {
    let module = std::fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
    let client = client_for(config, backends)?;
    client.registry().spawn_discovery();

    let operation = if asm {
        OperationKind::Disassemble
    } else {
        OperationKind::Execute
    };
    let output = client.dispatch(platform, operation, Bytes::from(module)).await?;
    print!("{output}");
    Ok(())
}

async fn cmd_platforms(config: ModgateConfig, backends: Vec<String>) -> Result<()> {
    let client = client_for(config, backends)?;
    let platforms = client.registry().platforms().await;
    if platforms.is_empty() {
        println!("No platforms available.");
    }
    for platform in platforms {
        println!("{platform}");
    }
    Ok(())
}
