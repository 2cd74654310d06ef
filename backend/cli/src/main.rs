use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rockhold_config::{config_dir, config_file_path, load_and_prepare, RockholdConfig};
use rockhold_gateway::{GatewayRole, GatewayState};
use rockhold_sandbox::{DockerDeploymentDriver, MockDeploymentDriver, SandboxRegistry};
use rockhold_warmup::{RetryPolicy, WarmupPool};
use tracing::info;

#[derive(Parser)]
#[command(name = "rockhold")]
#[command(about = "Sandbox orchestration control plane")]
#[command(version)]
struct Cli {
    /// Path to the config file; defaults to `<config_dir>/config.yaml`
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a control plane HTTP server
    Serve {
        /// Which role this process serves
        #[arg(long, value_enum, default_value_t = RoleArg::Write)]
        role: RoleArg,

        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,

        /// Use an in-memory mock deployment driver instead of a live Docker
        /// daemon (for tests and local development without containers).
        #[arg(long)]
        mock: bool,
    },
    /// Query a running control plane's health endpoint
    Status {
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Write,
    Read,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(|| config_file_path(&config_dir()));
    let config = load_and_prepare(&config_path).await.context("failed to load config")?;

    rockhold_logging::init_logger(&config.logging.dir, &config.logging.level);

    match cli.command {
        Commands::Serve { role, port, mock } => {
            let role = match role {
                RoleArg::Write => GatewayRole::Write,
                RoleArg::Read => GatewayRole::Read,
            };
            run_server(config, role, port, mock).await?;
        }
        Commands::Status { port } => {
            let port = port.unwrap_or(config.service.port);
            let client = reqwest::Client::new();
            match client.get(format!("http://localhost:{port}/api/health")).send().await {
                Ok(resp) => {
                    let body: serde_json::Value = resp.json().await?;
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Err(_) => {
                    println!("rockhold is not running on port {port}");
                }
            }
        }
    }

    Ok(())
}

async fn run_server(config: RockholdConfig, role: GatewayRole, port: Option<u16>, mock: bool) -> Result<()> {
    let status_dir = PathBuf::from(&config.service.status_dir);
    tokio::fs::create_dir_all(&status_dir)
        .await
        .with_context(|| format!("failed to create status dir: {}", status_dir.display()))?;

    let driver: Arc<dyn rockhold_core::DeploymentDriver> = if mock {
        Arc::new(MockDeploymentDriver::new())
    } else {
        Arc::new(DockerDeploymentDriver::connect().context("failed to connect to Docker daemon")?)
    };

    let registry = Arc::new(SandboxRegistry::new());
    let warmup = WarmupPool::new(driver.clone(), registry.clone(), status_dir.clone(), RetryPolicy::default());

    let state = Arc::new(GatewayState { role, registry, driver, warmup, status_dir });

    let bind_port = port.unwrap_or(config.service.port);
    let addr: SocketAddr = format!("{}:{}", config.service.host, bind_port)
        .parse()
        .context("invalid host/port combination")?;

    info!(?role, %addr, "starting rockhold control plane");
    rockhold_gateway::start_server(addr, state).await
}
