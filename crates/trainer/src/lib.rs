//! Petal Trainer - deterministic offline trainer
//!
//! Loads the iris CSV, performs a seeded stratified split, fits the
//! multinomial logistic regression and publishes the model together with
//! its metrics record to the configured artifact store.

pub mod config;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod trainer;

use petal_artifact_store::{ArtifactStore, PublishReceipt};
use std::path::Path;
use tracing::info;

pub use config::TrainerConfig;
pub use dataset::{Dataset, DatasetError};
pub use deterministic::LcgRng;
pub use errors::TrainerError;
pub use trainer::{Trainer, TrainingOutcome, TrainingParams};

/// Train directly from a CSV file using the provided parameters.
pub fn train_model_from_csv(path: &Path, params: TrainingParams) -> Result<TrainingOutcome, TrainerError> {
    let dataset = Dataset::from_csv(path)?;
    Trainer::new(params).train(&dataset)
}

/// Full pipeline: load, train, publish.
pub async fn run_training(
    config: &TrainerConfig,
    store: &dyn ArtifactStore,
) -> Result<(TrainingOutcome, PublishReceipt), TrainerError> {
    config.validate()?;

    info!(path = %config.dataset.display(), "loading dataset");
    let dataset = Dataset::from_csv(&config.dataset)?;
    info!(
        samples = dataset.len(),
        classes = dataset.class_counts().len(),
        "dataset loaded"
    );

    let outcome = Trainer::new(config.training.clone()).train(&dataset)?;

    info!(store = %store.describe(), "publishing artifacts");
    let receipt = store.publish(&outcome.to_artifacts()).await?;
    Ok((outcome, receipt))
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
