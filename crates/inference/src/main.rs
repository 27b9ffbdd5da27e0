//! Petal inference server

use anyhow::{Context, Result};
use clap::Parser;
use petal_artifact_store::{BackendKind, StoreConfig};
use petal_inference::{create_router, load_model};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "petal-serve")]
#[command(about = "Serve iris species predictions over HTTP")]
#[command(version)]
struct Cli {
    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Bind port
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Artifact backend: local or tracking
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Directory holding the local model files
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut store = StoreConfig::from_env().context("Invalid artifact store environment")?;
    if let Some(backend) = cli.backend {
        store.backend = backend;
    }
    if let Some(dir) = cli.model_dir {
        store.artifact_dir = dir;
    }

    let state = load_model(&store)
        .await
        .context("Failed to load model, refusing to start")?;
    let app = create_router(state);

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind listener on {addr}"))?;
    info!("🚀 Petal inference server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated unexpectedly")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
