//! Inference server error types

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Per-request failures reported to the caller
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body could not be turned into a prediction request
    #[error("{0}")]
    InvalidRequest(#[from] JsonRejection),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(rejection) => rejection.status(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::InvalidRequest(rejection) => rejection.body_text(),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
