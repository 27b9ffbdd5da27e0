//! Multinomial logistic regression
//!
//! Minimizes softmax cross-entropy plus an L2 penalty `(1 / 2C) * |W|^2` on
//! the coefficients (intercepts are not penalized). The solver takes full
//! Newton steps damped by Armijo backtracking, so a fit is a pure function of
//! its inputs: identical data and parameters always produce identical models.

use crate::errors::{CoreError, Result};
use crate::linalg;
use crate::metrics::accuracy_score;
use crate::types::{Sample, Species, FEATURE_COLUMNS, FEATURE_COUNT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Solver name recorded with every training run
pub const SOLVER_NAME: &str = "newton";

/// Current on-disk model format
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Width of one class's parameter row: intercept followed by coefficients
const ROW_WIDTH: usize = FEATURE_COUNT + 1;

/// Keeps the Hessian invertible along the shared-intercept direction
const INTERCEPT_RIDGE: f64 = 1e-8;

const ARMIJO_C: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 40;

/// Training parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticRegression {
    /// Inverse regularization strength
    pub c: f64,
    /// Newton iteration cap
    pub max_iter: usize,
    /// Convergence tolerance on the max-abs gradient entry
    pub tol: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 200,
            tol: 1e-4,
        }
    }
}

/// Fitted classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrisModel {
    pub version: u32,
    pub solver: String,
    pub classes: Vec<Species>,
    pub feature_names: Vec<String>,
    /// One coefficient row per class, columns ordered as `feature_names`
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
    /// Newton iterations used during fitting
    pub iterations: usize,
}

impl LogisticRegression {
    pub fn new(c: f64, max_iter: usize, tol: f64) -> Self {
        Self { c, max_iter, tol }
    }

    /// Fit the classifier on `samples` labelled by `labels`
    pub fn fit(&self, samples: &[Sample], labels: &[Species]) -> Result<IrisModel> {
        self.validate_params()?;
        if samples.is_empty() {
            return Err(CoreError::InvalidInput("no training samples".into()));
        }
        if samples.len() != labels.len() {
            return Err(CoreError::InvalidInput(format!(
                "{} samples but {} labels",
                samples.len(),
                labels.len()
            )));
        }
        if let Some(idx) = samples.iter().position(|s| !s.is_finite()) {
            return Err(CoreError::InvalidInput(format!(
                "sample {idx} has a non-finite feature"
            )));
        }

        let mut classes: Vec<Species> = labels.to_vec();
        classes.sort();
        classes.dedup();
        if classes.len() < 2 {
            return Err(CoreError::InvalidInput(format!(
                "need at least two classes, found {}",
                classes.len()
            )));
        }

        let problem = Problem::new(samples, labels, &classes, self.c);
        let mut params = vec![0.0; problem.dim()];

        for iteration in 0..self.max_iter {
            let (gradient, hessian) = problem.gradient_hessian(&params);
            let gradient_norm = max_abs(&gradient);
            debug!(iteration, gradient_norm, "newton iteration");

            if gradient_norm <= self.tol {
                info!(iterations = iteration, gradient_norm, "solver converged");
                return Ok(problem.into_model(&params, iteration));
            }

            let rhs: Vec<f64> = gradient.iter().map(|g| -g).collect();
            let direction = linalg::solve(hessian, rhs)?;
            params = problem.line_search(&params, &gradient, &direction);
        }

        let (gradient, _) = problem.gradient_hessian(&params);
        let gradient_norm = max_abs(&gradient);
        if gradient_norm <= self.tol {
            info!(iterations = self.max_iter, gradient_norm, "solver converged");
            return Ok(problem.into_model(&params, self.max_iter));
        }

        Err(CoreError::Convergence {
            iterations: self.max_iter,
            gradient_norm,
        })
    }

    fn validate_params(&self) -> Result<()> {
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(CoreError::InvalidInput(format!("C must be positive, got {}", self.c)));
        }
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(CoreError::InvalidInput(format!("tol must be positive, got {}", self.tol)));
        }
        Ok(())
    }
}

impl IrisModel {
    /// Check structural consistency of a deserialized model
    pub fn validate(&self) -> Result<()> {
        if self.version != MODEL_FORMAT_VERSION {
            return Err(CoreError::ValidationFailed(format!(
                "unsupported model version: {}",
                self.version
            )));
        }
        if self.classes.len() < 2 {
            return Err(CoreError::ValidationFailed("model has fewer than two classes".into()));
        }
        if self.feature_names != FEATURE_COLUMNS {
            return Err(CoreError::ValidationFailed(format!(
                "unexpected feature columns: {:?}",
                self.feature_names
            )));
        }
        if self.coefficients.len() != self.classes.len() || self.intercepts.len() != self.classes.len() {
            return Err(CoreError::ValidationFailed(
                "parameter rows do not match class count".into(),
            ));
        }
        for (class, row) in self.classes.iter().zip(&self.coefficients) {
            if row.len() != FEATURE_COUNT {
                return Err(CoreError::ValidationFailed(format!(
                    "class {class} has {} coefficients",
                    row.len()
                )));
            }
        }
        let all_finite = self
            .coefficients
            .iter()
            .flatten()
            .chain(&self.intercepts)
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(CoreError::ValidationFailed("non-finite parameter".into()));
        }
        Ok(())
    }

    /// Raw class scores for a sample
    pub fn decision_function(&self, sample: &Sample) -> Vec<f64> {
        let x = sample.features();
        self.coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(row, b)| b + row.iter().zip(&x).map(|(w, v)| w * v).sum::<f64>())
            .collect()
    }

    /// Most probable species; ties resolve to the earlier class
    pub fn predict(&self, sample: &Sample) -> Species {
        let scores = self.decision_function(sample);
        let mut best = 0;
        for (idx, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = idx;
            }
        }
        self.classes[best]
    }

    /// Class probabilities, in `classes` order
    pub fn predict_proba(&self, sample: &Sample) -> Vec<(Species, f64)> {
        let probs = softmax(&self.decision_function(sample));
        self.classes.iter().copied().zip(probs).collect()
    }

    /// Accuracy of the model on a labelled set
    pub fn score(&self, samples: &[Sample], labels: &[Species]) -> f64 {
        let predicted: Vec<Species> = samples.iter().map(|s| self.predict(s)).collect();
        accuracy_score(labels, &predicted)
    }
}

/// Design matrix and one-hot targets for a single fit
struct Problem {
    rows: Vec<[f64; ROW_WIDTH]>,
    targets: Vec<usize>,
    classes: Vec<Species>,
    inv_c: f64,
}

impl Problem {
    fn new(samples: &[Sample], labels: &[Species], classes: &[Species], c: f64) -> Self {
        let rows = samples
            .iter()
            .map(|s| {
                let mut row = [1.0; ROW_WIDTH];
                row[1..].copy_from_slice(&s.features());
                row
            })
            .collect();
        // Every label is present in `classes` by construction.
        let targets = labels
            .iter()
            .map(|label| classes.iter().position(|c| c == label).unwrap_or(0))
            .collect();

        Self {
            rows,
            targets,
            classes: classes.to_vec(),
            inv_c: 1.0 / c,
        }
    }

    fn n_classes(&self) -> usize {
        self.classes.len()
    }

    fn dim(&self) -> usize {
        self.n_classes() * ROW_WIDTH
    }

    fn logits(&self, params: &[f64], row: &[f64; ROW_WIDTH]) -> Vec<f64> {
        params
            .chunks(ROW_WIDTH)
            .map(|w| w.iter().zip(row).map(|(a, b)| a * b).sum())
            .collect()
    }

    /// Penalized negative log-likelihood
    fn loss(&self, params: &[f64]) -> f64 {
        let data: f64 = self
            .rows
            .iter()
            .zip(&self.targets)
            .map(|(row, &target)| {
                let z = self.logits(params, row);
                log_sum_exp(&z) - z[target]
            })
            .sum();
        data + 0.5 * self.inv_c * self.penalty_norm(params)
    }

    fn penalty_norm(&self, params: &[f64]) -> f64 {
        params
            .chunks(ROW_WIDTH)
            .flat_map(|w| &w[1..])
            .map(|v| v * v)
            .sum()
    }

    fn gradient_hessian(&self, params: &[f64]) -> (Vec<f64>, Vec<Vec<f64>>) {
        let k = self.n_classes();
        let dim = self.dim();
        let mut gradient = vec![0.0; dim];
        let mut hessian = vec![vec![0.0; dim]; dim];

        for (row, &target) in self.rows.iter().zip(&self.targets) {
            let p = softmax(&self.logits(params, row));
            for a in 0..k {
                let residual = p[a] - if a == target { 1.0 } else { 0.0 };
                for j in 0..ROW_WIDTH {
                    gradient[a * ROW_WIDTH + j] += residual * row[j];
                }
                for b in 0..k {
                    let weight = p[a] * (if a == b { 1.0 } else { 0.0 } - p[b]);
                    if weight == 0.0 {
                        continue;
                    }
                    for i in 0..ROW_WIDTH {
                        let scaled = weight * row[i];
                        let h_row = &mut hessian[a * ROW_WIDTH + i];
                        for j in 0..ROW_WIDTH {
                            h_row[b * ROW_WIDTH + j] += scaled * row[j];
                        }
                    }
                }
            }
        }

        for a in 0..k {
            let base = a * ROW_WIDTH;
            hessian[base][base] += INTERCEPT_RIDGE;
            for j in 1..ROW_WIDTH {
                gradient[base + j] += self.inv_c * params[base + j];
                hessian[base + j][base + j] += self.inv_c;
            }
        }

        (gradient, hessian)
    }

    /// Armijo backtracking along `direction`
    fn line_search(&self, params: &[f64], gradient: &[f64], direction: &[f64]) -> Vec<f64> {
        let current = self.loss(params);
        let slope: f64 = gradient.iter().zip(direction).map(|(g, d)| g * d).sum();
        let mut step = 1.0;
        let mut candidate = params.to_vec();

        for _ in 0..MAX_BACKTRACKS {
            for ((c, p), d) in candidate.iter_mut().zip(params).zip(direction) {
                *c = p + step * d;
            }
            if self.loss(&candidate) <= current + ARMIJO_C * step * slope {
                break;
            }
            step *= 0.5;
        }
        candidate
    }

    fn into_model(self, params: &[f64], iterations: usize) -> IrisModel {
        let (intercepts, coefficients): (Vec<f64>, Vec<Vec<f64>>) = params
            .chunks(ROW_WIDTH)
            .map(|w| (w[0], w[1..].to_vec()))
            .unzip();

        IrisModel {
            version: MODEL_FORMAT_VERSION,
            solver: SOLVER_NAME.to_string(),
            classes: self.classes,
            feature_names: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            coefficients,
            intercepts,
            iterations,
        }
    }
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

fn log_sum_exp(z: &[f64]) -> f64 {
    let max = z.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    max + z.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

fn softmax(z: &[f64]) -> Vec<f64> {
    let max = z.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = z.iter().map(|v| (v - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Two well-separated clusters per class, taken from the iris measurements
    fn toy_data() -> (Vec<Sample>, Vec<Species>) {
        let rows = [
            ([5.1, 3.5, 1.4, 0.2], Species::Setosa),
            ([4.9, 3.0, 1.4, 0.2], Species::Setosa),
            ([4.7, 3.2, 1.3, 0.2], Species::Setosa),
            ([5.0, 3.6, 1.4, 0.2], Species::Setosa),
            ([7.0, 3.2, 4.7, 1.4], Species::Versicolor),
            ([6.4, 3.2, 4.5, 1.5], Species::Versicolor),
            ([5.5, 2.3, 4.0, 1.3], Species::Versicolor),
            ([5.7, 2.8, 4.5, 1.3], Species::Versicolor),
            ([6.3, 3.3, 6.0, 2.5], Species::Virginica),
            ([7.1, 3.0, 5.9, 2.1], Species::Virginica),
            ([6.5, 3.0, 5.8, 2.2], Species::Virginica),
            ([7.6, 3.0, 6.6, 2.1], Species::Virginica),
        ];
        rows.iter()
            .map(|(f, s)| (Sample::from_features(*f), *s))
            .unzip()
    }

    #[test]
    fn test_fit_separates_toy_clusters() {
        let (samples, labels) = toy_data();
        let model = LogisticRegression::default().fit(&samples, &labels).unwrap();

        assert_eq!(model.classes, Species::ALL.to_vec());
        assert_eq!(model.solver, SOLVER_NAME);
        assert!(model.iterations > 0);
        assert!(model.score(&samples, &labels) >= 0.9);
        assert_eq!(model.predict(&Sample::new(5.0, 3.4, 1.5, 0.2)), Species::Setosa);
        model.validate().unwrap();
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (samples, labels) = toy_data();
        let params = LogisticRegression::default();
        let first = params.fit(&samples, &labels).unwrap();
        let second = params.fit(&samples, &labels).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_iteration_cap_reports_convergence_error() {
        let (samples, labels) = toy_data();
        let params = LogisticRegression::new(1.0, 1, 1e-12);
        let err = params.fit(&samples, &labels).unwrap_err();
        assert!(matches!(err, CoreError::Convergence { iterations: 1, .. }));
    }

    #[test]
    fn test_rejects_single_class() {
        let samples = vec![Sample::new(5.0, 3.0, 1.0, 0.2); 3];
        let labels = vec![Species::Setosa; 3];
        let err = LogisticRegression::default().fit(&samples, &labels).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn test_rejects_mismatched_lengths_and_bad_params() {
        let (samples, labels) = toy_data();
        assert!(LogisticRegression::default().fit(&samples, &labels[1..]).is_err());
        assert!(LogisticRegression::new(0.0, 10, 1e-4).fit(&samples, &labels).is_err());
        assert!(LogisticRegression::default().fit(&[], &[]).is_err());
    }

    #[test]
    fn test_rejects_non_finite_features() {
        let (mut samples, labels) = toy_data();
        samples[3].petal_width = f64::INFINITY;
        let err = LogisticRegression::default().fit(&samples, &labels).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn test_validate_rejects_malformed_model() {
        let (samples, labels) = toy_data();
        let mut model = LogisticRegression::default().fit(&samples, &labels).unwrap();
        model.intercepts.pop();
        assert!(model.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_probabilities_sum_to_one(
            a in 0.1f64..10.0, b in 0.1f64..10.0, c in 0.1f64..10.0, d in 0.1f64..10.0
        ) {
            let (samples, labels) = toy_data();
            let model = LogisticRegression::default().fit(&samples, &labels).unwrap();
            let probs = model.predict_proba(&Sample::new(a, b, c, d));
            let total: f64 = probs.iter().map(|(_, p)| p).sum();
            prop_assert!((total - 1.0).abs() < 1e-9);
            prop_assert!(probs.iter().all(|(_, p)| (0.0..=1.0).contains(p)));
        }
    }
}
