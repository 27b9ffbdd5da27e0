//! Artifact store error types

use thiserror::Error;

/// Errors raised while persisting or loading training artifacts
#[derive(Error, Debug)]
pub enum StoreError {
    /// Artifact, run or registered model does not exist yet
    #[error("Artifact not found: {0}")]
    NotFound(String),

    /// Missing or invalid store configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stored model bytes do not match the recorded digest
    #[error("Model hash mismatch: expected {expected}, found {actual}")]
    HashMismatch { expected: String, actual: String },

    /// Stored model failed structural validation
    #[error("Invalid model artifact: {0}")]
    InvalidModel(String),

    /// Tracking service rejected a request
    #[error("Tracking service error ({status}) {code}: {message}")]
    Tracking {
        status: u16,
        code: String,
        message: String,
    },

    /// Transport-level HTTP failure
    #[error("Network error: {0}")]
    Network(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Network(err.to_string())
    }
}

impl From<petal_ml_core::CoreError> for StoreError {
    fn from(err: petal_ml_core::CoreError) -> Self {
        StoreError::InvalidModel(err.to_string())
    }
}

/// Result type for artifact store operations
pub type Result<T> = std::result::Result<T, StoreError>;
