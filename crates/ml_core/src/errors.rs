//! Error types for model fitting and inference

use thiserror::Error;

/// Errors that can occur while fitting or (de)serializing a model
#[derive(Error, Debug)]
pub enum CoreError {
    /// Training input rejected before fitting
    #[error("Invalid training input: {0}")]
    InvalidInput(String),

    /// Solver hit the iteration cap
    #[error("Solver failed to converge after {iterations} iterations (gradient norm {gradient_norm:e})")]
    Convergence { iterations: usize, gradient_norm: f64 },

    /// Newton system could not be solved
    #[error("Singular Newton system at pivot {0}")]
    SingularSystem(usize),

    /// Unknown species label
    #[error("Unknown species label: {0}")]
    UnknownSpecies(String),

    /// Stored model is structurally invalid
    #[error("Model validation failed: {0}")]
    ValidationFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
