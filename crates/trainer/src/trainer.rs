//! Training pipeline: split, fit, score.

use petal_artifact_store::TrainingArtifacts;
use petal_ml_core::{IrisModel, LogisticRegression, MetricsRecord, SOLVER_NAME};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::dataset::Dataset;
use crate::errors::TrainerError;

/// Training configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    /// Seed for the stratified split
    pub seed: u64,
    /// Held-out fraction
    pub test_size: f64,
    pub model: LogisticRegression,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            seed: 42,
            test_size: 0.2,
            model: LogisticRegression::default(),
        }
    }
}

impl TrainingParams {
    pub fn validate(&self) -> Result<(), TrainerError> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(TrainerError::Config(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if self.model.max_iter == 0 {
            return Err(TrainerError::Config("max_iter must be at least 1".into()));
        }
        Ok(())
    }

    /// Parameters as recorded alongside a run
    pub fn run_params(&self) -> BTreeMap<String, String> {
        [
            ("solver", SOLVER_NAME.to_string()),
            ("max_iter", self.model.max_iter.to_string()),
            ("C", self.model.c.to_string()),
            ("tol", self.model.tol.to_string()),
            ("seed", self.seed.to_string()),
            ("test_size", self.test_size.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// Result of one training run
#[derive(Clone, Debug)]
pub struct TrainingOutcome {
    pub model: IrisModel,
    pub metrics: MetricsRecord,
    pub params: TrainingParams,
}

impl TrainingOutcome {
    pub fn accuracy(&self) -> f64 {
        self.metrics.accuracy().unwrap_or_default()
    }

    pub fn to_artifacts(&self) -> TrainingArtifacts {
        TrainingArtifacts {
            model: self.model.clone(),
            metrics: self.metrics.clone(),
            params: self.params.run_params(),
        }
    }
}

/// Logistic regression trainer
pub struct Trainer {
    params: TrainingParams,
}

impl Trainer {
    pub fn new(params: TrainingParams) -> Self {
        Self { params }
    }

    /// Split `dataset`, fit on the training part and score on the held-out part
    pub fn train(&self, dataset: &Dataset) -> Result<TrainingOutcome, TrainerError> {
        self.params.validate()?;

        let (train, test) = dataset.stratified_split(self.params.test_size, self.params.seed)?;
        info!(
            train = train.len(),
            test = test.len(),
            seed = self.params.seed,
            "stratified split"
        );

        let model = self.params.model.fit(&train.samples, &train.labels)?;
        let accuracy = model.score(&test.samples, &test.labels);
        let train_accuracy = model.score(&train.samples, &train.labels);
        info!(accuracy, train_accuracy, iterations = model.iterations, "model fitted");

        let mut metrics = MetricsRecord::new(accuracy);
        metrics.insert("train_accuracy", train_accuracy);
        metrics.insert("train_samples", train.len() as f64);
        metrics.insert("test_samples", test.len() as f64);
        metrics.insert("iterations", model.iterations as f64);

        Ok(TrainingOutcome {
            model,
            metrics,
            params: self.params.clone(),
        })
    }
}
