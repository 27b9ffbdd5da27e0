//! Evaluation metrics

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the held-out accuracy metric
pub const ACCURACY: &str = "accuracy";

/// Fraction of positions where `truth` and `predicted` agree.
///
/// Returns 0.0 for empty input; extra trailing entries in the longer slice
/// are ignored.
pub fn accuracy_score<T: PartialEq>(truth: &[T], predicted: &[T]) -> f64 {
    let total = truth.len().min(predicted.len());
    if total == 0 {
        return 0.0;
    }
    let correct = truth
        .iter()
        .zip(predicted)
        .filter(|(t, p)| t == p)
        .count();
    correct as f64 / total as f64
}

/// Metric name to scalar value, written once per training run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsRecord(BTreeMap<String, f64>);

impl MetricsRecord {
    pub fn new(accuracy: f64) -> Self {
        let mut record = Self::default();
        record.insert(ACCURACY, accuracy);
        record
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.get(ACCURACY)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Species;

    #[test]
    fn test_accuracy_score() {
        let truth = [Species::Setosa, Species::Versicolor, Species::Virginica, Species::Setosa];
        let predicted = [Species::Setosa, Species::Virginica, Species::Virginica, Species::Setosa];
        assert_eq!(accuracy_score(&truth, &predicted), 0.75);
        assert_eq!(accuracy_score::<Species>(&[], &[]), 0.0);
    }

    #[test]
    fn test_metrics_record_json_shape() {
        let mut record = MetricsRecord::new(0.9);
        record.insert("test_samples", 30.0);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["accuracy"], 0.9);
        assert_eq!(json["test_samples"], 30.0);

        let back: MetricsRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.accuracy(), Some(0.9));
        assert_eq!(back.len(), 2);
    }
}
