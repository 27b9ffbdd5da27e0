//! Petal Artifact Store
//!
//! Persists what a training run produces (the fitted model and its metrics
//! record) and hands the model back to the inference server at startup.
//! Two interchangeable backends sit behind [`ArtifactStore`]:
//! - [`LocalStore`]: fixed files in a directory, overwritten on each run
//! - [`TrackingStore`]: append-only run history in an MLflow-compatible
//!   tracking service, with the model registered under a logical name

pub mod config;
pub mod errors;
pub mod local;
pub mod tracking;

use async_trait::async_trait;
use petal_ml_core::{IrisModel, MetricsRecord};
use std::collections::BTreeMap;

pub use config::{BackendKind, StoreConfig};
pub use errors::{Result, StoreError};
pub use local::LocalStore;
pub use tracking::{ModelVersion, RunHandle, RunRecord, TrackingClient, TrackingStore};

/// Everything one training run hands to the store
#[derive(Debug, Clone)]
pub struct TrainingArtifacts {
    pub model: IrisModel,
    pub metrics: MetricsRecord,
    /// Run parameters (solver, iteration cap, seed, ...)
    pub params: BTreeMap<String, String>,
}

/// Where a publish landed
#[derive(Debug, Clone, PartialEq)]
pub struct PublishReceipt {
    /// Directory path or run id
    pub location: String,
    pub model_hash: String,
    pub run_id: Option<String>,
    pub model_version: Option<String>,
}

/// A model read back from the store, verified against its digest
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub model: IrisModel,
    pub hash: String,
    pub source: String,
}

/// Read/write contract shared by the trainer and the inference server
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist model, metrics and parameters of one run
    async fn publish(&self, artifacts: &TrainingArtifacts) -> Result<PublishReceipt>;

    /// Load the most recently published model
    async fn load_model(&self) -> Result<LoadedModel>;

    /// Load the most recently published metrics record
    async fn load_metrics(&self) -> Result<MetricsRecord>;

    /// Backend name for logs
    fn describe(&self) -> String;
}

/// Build the backend selected by `config`
pub fn open_store(config: &StoreConfig) -> Result<Box<dyn ArtifactStore>> {
    config.validate()?;
    match config.backend {
        BackendKind::Local => Ok(Box::new(LocalStore::new(&config.artifact_dir))),
        BackendKind::Tracking => {
            let client = TrackingClient::new(config.require_tracking_uri()?)?;
            Ok(Box::new(TrackingStore::new(
                client,
                config.experiment_name.clone(),
                config.registered_model.clone(),
            )))
        }
    }
}

/// Deserialize and check model bytes against an optional recorded digest
pub(crate) fn decode_model(bytes: &[u8], expected_hash: Option<&str>) -> Result<(IrisModel, String)> {
    let actual = petal_ml_core::hash_bytes_hex(bytes);
    if let Some(expected) = expected_hash {
        let expected = expected.trim();
        if expected != actual {
            return Err(StoreError::HashMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
    }
    let model: IrisModel = serde_json::from_slice(bytes)?;
    model.validate()?;
    Ok((model, actual))
}

/// Canonical model bytes and their digest
pub(crate) fn encode_model(model: &IrisModel) -> Result<(String, String)> {
    let json = petal_ml_core::canonical_json_string(model)?;
    let hash = petal_ml_core::hash_bytes_hex(json.as_bytes());
    Ok((json, hash))
}
