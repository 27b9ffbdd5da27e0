//! Petal Inference - HTTP prediction server
//!
//! Loads one model from the artifact store at startup and serves
//! predictions from it. The model is never mutated after load.

pub mod api;
pub mod errors;

use petal_artifact_store::{open_store, StoreConfig, StoreError};
use tracing::info;

pub use api::{create_router, AppState, PredictRequest, PredictResponse, ROOT_MESSAGE};
pub use errors::ApiError;

/// Load the latest published model; any failure is fatal to startup
pub async fn load_model(config: &StoreConfig) -> Result<AppState, StoreError> {
    let store = open_store(config)?;
    info!(store = %store.describe(), "loading model");

    let loaded = store.load_model().await?;
    info!(source = %loaded.source, hash = %loaded.hash, "model loaded");
    Ok(AppState::new(loaded.model, loaded.hash))
}
