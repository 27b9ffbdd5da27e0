//! HTTP routes

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use petal_ml_core::{IrisModel, Sample};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::errors::ApiError;

/// Static status message served on `GET /`
pub const ROOT_MESSAGE: &str = "API is running. POST to /predict for predictions.";

/// Immutable state shared by every request
#[derive(Debug, Clone)]
pub struct AppState {
    pub model: Arc<IrisModel>,
    pub model_hash: String,
}

impl AppState {
    pub fn new(model: IrisModel, model_hash: impl Into<String>) -> Self {
        Self {
            model: Arc::new(model),
            model_hash: model_hash.into(),
        }
    }
}

type SharedState = Arc<AppState>;

/// Prediction request: exactly the four measurements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictRequest {
    pub sepal_length: f64,
    pub sepal_width: f64,
    pub petal_length: f64,
    pub petal_width: f64,
}

impl From<PredictRequest> for Sample {
    fn from(req: PredictRequest) -> Self {
        Sample::new(req.sepal_length, req.sepal_width, req.petal_length, req.petal_width)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub species_prediction: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    message: &'static str,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/predict", post(handle_predict))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn handle_root() -> Json<StatusResponse> {
    Json(StatusResponse {
        message: ROOT_MESSAGE,
    })
}

async fn handle_predict(
    State(state): State<SharedState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(request) = payload?;
    let species = state.model.predict(&Sample::from(request));
    debug!(model = %state.model_hash, %species, "prediction served");

    Ok(Json(PredictResponse {
        species_prediction: species.to_string(),
    }))
}
