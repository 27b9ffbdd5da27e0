use petal_artifact_store::StoreError;
use petal_ml_core::CoreError;
use thiserror::Error;

use crate::dataset::DatasetError;

/// Errors returned by the trainer.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("training error: {0}")]
    Training(#[from] CoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("artifact error: {0}")]
    Artifact(#[from] StoreError),
}

impl TrainerError {
    /// True when the solver hit its iteration cap
    pub fn is_convergence(&self) -> bool {
        matches!(self, TrainerError::Training(CoreError::Convergence { .. }))
    }
}
