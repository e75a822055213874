//! Workflow manager entry point
//!
//! Loads the configuration, registers the configured agents, and serves the HTTP front
//! door until SIGINT or SIGTERM.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{error, info, warn};
use workflow_manager::agent::AgentRegistry;
use workflow_manager::config::WorkflowConfig;
use workflow_manager::observability::{init_default_logging, WorkflowMetrics};
use workflow_manager::protocol::AgentDescriptor;
use workflow_manager::server::{self, AppState};
use workflow_manager::transport::{AgentClientConfig, HttpAgentClient};
use workflow_manager::workflow::WorkflowService;

/// Default configuration locations, tried in order
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["workflow.toml", "config/workflow.toml"];

/// Multi-agent workflow manager
#[derive(Parser)]
#[command(name = "workflow-manager")]
#[command(about = "Routes messages through SESSION, MISSION, FUNCTION and CHECKER agents")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP front door
    Serve {
        /// Override the configured listen host
        #[arg(long, env = "WORKFLOW_HOST")]
        host: Option<String>,
        /// Override the configured listen port
        #[arg(long, env = "WORKFLOW_PORT")]
        port: Option<u16>,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting workflow manager v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve { host, port } => run_server(config, host, port).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: Option<&Path>,
) -> Result<WorkflowConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(WorkflowConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(WorkflowConfig::load_from_file(path)?);
        }
    }

    warn!("No configuration file found, using defaults");
    Ok(WorkflowConfig::default())
}

async fn run_server(
    config: WorkflowConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = Arc::new(build_service(&config)?);

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    info!(
        agents = service.registry().len(),
        stages = service.stages().len(),
        "Workflow service ready"
    );

    let serve_result =
        server::serve(AppState::new(service.clone()), addr, shutdown_signal()).await;

    info!("Application shutdown initiated");
    service.close().await;
    serve_result?;
    Ok(())
}

/// Wire registry, HTTP client and metrics into a service
fn build_service(config: &WorkflowConfig) -> Result<WorkflowService, Box<dyn std::error::Error>> {
    let registry = Arc::new(AgentRegistry::new());
    for registration in &config.agents {
        let descriptor = AgentDescriptor::try_from(registration.clone())?;
        registry.register(descriptor)?;
    }

    let client = HttpAgentClient::new(AgentClientConfig::from_config(config)?);
    let service = WorkflowService::from_config(config, registry, Arc::new(client))?
        .with_metrics(Arc::new(WorkflowMetrics::new()));
    Ok(service)
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let sigint = install_handler(SignalKind::interrupt(), "SIGINT");
    let sigterm = install_handler(SignalKind::terminate(), "SIGTERM");
    wait_for_signal(sigint, sigterm).await;
}

fn install_handler(kind: SignalKind, name: &str) -> Option<Signal> {
    match signal(kind) {
        Ok(handler) => Some(handler),
        Err(e) => {
            error!(signal = name, error = %e, "Failed to install signal handler");
            None
        }
    }
}

/// Waits on whichever handlers were installed; with none, never resolves
async fn wait_for_signal(mut sigint: Option<Signal>, mut sigterm: Option<Signal>) {
    if sigint.is_none() && sigterm.is_none() {
        warn!("No shutdown signal handler installed, serving until the process is killed");
    }

    tokio::select! {
        _ = recv_or_pending(sigint.as_mut()) => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = recv_or_pending(sigterm.as_mut()) => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

async fn recv_or_pending(handler: Option<&mut Signal>) {
    match handler {
        Some(handler) => {
            handler.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn handle_config_command(
    config: &WorkflowConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!(
        agents = config.agents.len(),
        stages = config.workflow.stages.len(),
        "Configuration validation complete"
    );
    Ok(())
}
