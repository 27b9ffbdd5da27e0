//! Petal trainer CLI
//!
//! Runs with no arguments: trains on `data/iris.csv` and writes the model
//! and metrics into the working directory.

use anyhow::{Context, Result};
use clap::Parser;
use petal_artifact_store::{open_store, BackendKind};
use petal_trainer::{run_training, TrainerConfig, VERSION};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "petal-train")]
#[command(author = "Petal Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train the iris classifier and publish its artifacts", long_about = None)]
struct Args {
    /// TOML configuration file (defaults to ./petal.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input CSV dataset path
    #[arg(short, long)]
    dataset: Option<PathBuf>,

    /// Directory for local artifacts
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Artifact backend: local or tracking
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Seed for the stratified split
    #[arg(long)]
    seed: Option<u64>,

    /// Solver iteration cap
    #[arg(long)]
    max_iter: Option<usize>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, config: &mut TrainerConfig) {
        if let Some(dataset) = &self.dataset {
            config.dataset = dataset.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.store.artifact_dir = dir.clone();
        }
        if let Some(backend) = self.backend {
            config.store.backend = backend;
        }
        if let Some(seed) = self.seed {
            config.training.seed = seed;
        }
        if let Some(max_iter) = self.max_iter {
            config.training.model.max_iter = max_iter;
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    info!("Petal trainer v{}", VERSION);

    let mut config = TrainerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);

    info!("Training configuration:");
    info!("  Dataset: {}", config.dataset.display());
    info!("  Seed: {}", config.training.seed);
    info!("  Test size: {}", config.training.test_size);
    info!("  Max iterations: {}", config.training.model.max_iter);
    info!("  C: {}", config.training.model.c);
    info!("  Backend: {}", config.store.backend);

    let store = open_store(&config.store).context("Failed to open artifact store")?;
    let (outcome, receipt) = run_training(&config, store.as_ref())
        .await
        .context("Training run failed")?;

    info!("Accuracy: {:.4}", outcome.accuracy());
    info!("Model hash: {}", receipt.model_hash);
    if let Some(run_id) = &receipt.run_id {
        info!("Run: {}", run_id);
    }
    if let Some(version) = &receipt.model_version {
        info!("Registered version: {}", version);
    }
    info!("✓ Artifacts published to {}", receipt.location);

    Ok(())
}
