//! CSV dataset loading and validation
//!
//! Reads the fixed five-column iris schema and provides the seeded,
//! stratified train/test split used by the trainer.

use csv::{ReaderBuilder, StringRecord, Trim};
use petal_ml_core::{Sample, Species, FEATURE_COLUMNS, LABEL_COLUMN};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::deterministic::LcgRng;

/// Problems found while loading or splitting a dataset
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("dataset is empty")]
    Empty,

    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("unexpected column: {0}")]
    UnexpectedColumn(String),

    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("line {line}: expected {expected} cells, got {found}")]
    CellCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: missing value for {column}")]
    MissingValue { line: usize, column: String },

    #[error("line {line}, column {column}: invalid number {value:?}")]
    InvalidNumber {
        line: usize,
        column: String,
        value: String,
    },

    #[error("line {line}, column {column}: expected a positive measurement, got {value}")]
    NonPositive {
        line: usize,
        column: String,
        value: f64,
    },

    #[error("line {line}: unknown species {value:?}")]
    UnknownLabel { line: usize, value: String },

    #[error("invalid split: {0}")]
    InvalidSplit(String),
}

/// Labelled training data
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    pub samples: Vec<Sample>,
    pub labels: Vec<Species>,
    columns: Vec<String>,
}

impl Dataset {
    /// Build a dataset from already-validated rows
    pub fn new(samples: Vec<Sample>, labels: Vec<Species>) -> Self {
        let columns = FEATURE_COLUMNS
            .iter()
            .chain(std::iter::once(&LABEL_COLUMN))
            .map(|c| c.to_string())
            .collect();
        Self {
            samples,
            labels,
            columns,
        }
    }

    /// Load dataset from CSV file
    /// Expected header: sepal_length,sepal_width,petal_length,petal_width,species (any order)
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse CSV text; blank lines, `#` comments and a leading BOM are skipped
    pub fn parse(content: &str) -> Result<Self, DatasetError> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .comment(Some(b'#'))
            .flexible(true)
            .from_reader(content.as_bytes());

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if columns.iter().all(|c| c.is_empty()) {
            return Err(DatasetError::Empty);
        }
        let layout = ColumnLayout::resolve(&columns)?;

        let mut samples = Vec::new();
        let mut labels = Vec::new();

        for record in reader.records() {
            let record = record?;
            if is_blank(&record) {
                continue;
            }
            let line_no = record.position().map_or(0, |p| p.line() as usize);
            if record.len() != columns.len() {
                return Err(DatasetError::CellCount {
                    line: line_no,
                    expected: columns.len(),
                    found: record.len(),
                });
            }

            let mut features = [0.0; FEATURE_COLUMNS.len()];
            for (slot, (&name, &idx)) in FEATURE_COLUMNS.iter().zip(&layout.features).enumerate() {
                features[slot] = parse_measurement(line_no, name, &record[idx])?;
            }

            let raw_label = &record[layout.label];
            if raw_label.is_empty() {
                return Err(DatasetError::MissingValue {
                    line: line_no,
                    column: LABEL_COLUMN.to_string(),
                });
            }
            let label = raw_label
                .parse::<Species>()
                .map_err(|_| DatasetError::UnknownLabel {
                    line: line_no,
                    value: raw_label.to_string(),
                })?;

            samples.push(Sample::from_features(features));
            labels.push(label);
        }

        if samples.is_empty() {
            return Err(DatasetError::Empty);
        }

        Ok(Self {
            samples,
            labels,
            columns,
        })
    }

    /// Column names in file order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Missing cells; loading rejects them, so a loaded dataset always reports 0
    pub fn missing_values(&self) -> usize {
        self.samples.iter().filter(|s| !s.is_finite()).count()
    }

    /// Get number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if dataset is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Rows per species
    pub fn class_counts(&self) -> BTreeMap<Species, usize> {
        let mut counts = BTreeMap::new();
        for label in &self.labels {
            *counts.entry(*label).or_insert(0) += 1;
        }
        counts
    }

    /// Seeded split preserving class proportions.
    ///
    /// Each species' rows are shuffled independently and `round(count * test_size)`
    /// of them (at least one, leaving at least one for training) go to the test
    /// partition. Both partitions keep the original row order.
    pub fn stratified_split(&self, test_size: f64, seed: u64) -> Result<(Dataset, Dataset), DatasetError> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(DatasetError::InvalidSplit(format!(
                "test_size must be in (0, 1), got {test_size}"
            )));
        }

        let mut rng = LcgRng::new(seed);
        let mut train_idx = Vec::with_capacity(self.len());
        let mut test_idx = Vec::new();

        for species in Species::ALL {
            let mut rows: Vec<usize> = self
                .labels
                .iter()
                .enumerate()
                .filter(|(_, label)| **label == species)
                .map(|(idx, _)| idx)
                .collect();
            if rows.is_empty() {
                continue;
            }
            if rows.len() < 2 {
                return Err(DatasetError::InvalidSplit(format!(
                    "species {species} has a single row; cannot stratify"
                )));
            }

            rng.shuffle(&mut rows);
            let n_test = ((rows.len() as f64 * test_size).round() as usize).clamp(1, rows.len() - 1);
            test_idx.extend_from_slice(&rows[..n_test]);
            train_idx.extend_from_slice(&rows[n_test..]);
        }

        train_idx.sort_unstable();
        test_idx.sort_unstable();
        Ok((self.subset(&train_idx), self.subset(&test_idx)))
    }

    fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            samples: indices.iter().map(|&i| self.samples[i]).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            columns: self.columns.clone(),
        }
    }
}

/// Header positions of the expected columns
struct ColumnLayout {
    features: [usize; FEATURE_COLUMNS.len()],
    label: usize,
}

impl ColumnLayout {
    fn resolve(columns: &[String]) -> Result<Self, DatasetError> {
        for (idx, name) in columns.iter().enumerate() {
            if !FEATURE_COLUMNS.contains(&name.as_str()) && name != LABEL_COLUMN {
                return Err(DatasetError::UnexpectedColumn(name.clone()));
            }
            if columns[..idx].contains(name) {
                return Err(DatasetError::DuplicateColumn(name.clone()));
            }
        }

        let position = |wanted: &str| {
            columns
                .iter()
                .position(|c| c == wanted)
                .ok_or_else(|| DatasetError::MissingColumn(wanted.to_string()))
        };

        let mut features = [0; FEATURE_COLUMNS.len()];
        for (slot, name) in FEATURE_COLUMNS.iter().enumerate() {
            features[slot] = position(name)?;
        }
        Ok(Self {
            features,
            label: position(LABEL_COLUMN)?,
        })
    }
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(str::is_empty)
}

fn parse_measurement(line: usize, column: &str, cell: &str) -> Result<f64, DatasetError> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") || cell.eq_ignore_ascii_case("na") {
        return Err(DatasetError::MissingValue {
            line,
            column: column.to_string(),
        });
    }
    let value = cell.parse::<f64>().map_err(|_| DatasetError::InvalidNumber {
        line,
        column: column.to_string(),
        value: cell.to_string(),
    })?;
    if !value.is_finite() || value <= 0.0 {
        return Err(DatasetError::NonPositive {
            line,
            column: column.to_string(),
            value,
        });
    }
    Ok(value)
}
