//! Petal ML Core
//!
//! Shared building blocks for the iris classifier:
//! - `types`: samples, species labels and the fixed column schema
//! - `logistic`: multinomial logistic regression (damped Newton solver)
//! - `metrics`: accuracy and the per-run metrics record
//! - `serialization`: canonical JSON and BLAKE3 model hashing
//! - `linalg`: the small dense solver used by the Newton step

pub mod errors;
pub mod linalg;
pub mod logistic;
pub mod metrics;
pub mod serialization;
pub mod types;

pub use errors::{CoreError, Result};
pub use logistic::{IrisModel, LogisticRegression, SOLVER_NAME};
pub use metrics::{accuracy_score, MetricsRecord, ACCURACY};
pub use serialization::{canonical_json_string, hash_bytes_hex, model_hash_hex, write_canonical_json};
pub use types::{Sample, Species, FEATURE_COLUMNS, LABEL_COLUMN};
