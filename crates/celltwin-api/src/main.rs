use anyhow::{Context, Result};
use celltwin_api::{load_config, AppConfig};
use celltwin_supervisor::CellSupervisor;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "celltwin", about = "Digital twin of a simulated sorting cell")]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the simulated cell and serve the twin over HTTP
    Serve {
        /// Listen address (overrides `api.bind`)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run the simulated cell and log twin snapshots periodically
    Monitor,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config);

    match cli.command {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Monitor => monitor(config).await,
    }
}

async fn serve(config: AppConfig, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.api.bind.clone());
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("cannot bind {bind}"))?;

    let mut supervisor = CellSupervisor::new(config.supervisor_config(false));
    supervisor.start()?;

    // a failing server stops the cell, and stopping the cell stops the server
    let twin = supervisor.twin();
    let shutdown = supervisor.cancellation_token().cancelled_owned();
    supervisor.supervise(
        "api-server",
        celltwin_api::serve(listener, twin, shutdown),
    );
    supervisor.run_until(shutdown_signal()).await
}

async fn monitor(config: AppConfig) -> Result<()> {
    let mut supervisor = CellSupervisor::new(config.supervisor_config(true));
    supervisor.start()?;
    supervisor.run_until(shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
