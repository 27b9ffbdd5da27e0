//! Sample and label types for the iris schema

use crate::errors::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Feature columns in the order the model consumes them
pub const FEATURE_COLUMNS: [&str; 4] = ["sepal_length", "sepal_width", "petal_length", "petal_width"];

/// Label column name
pub const LABEL_COLUMN: &str = "species";

/// Number of features per sample
pub const FEATURE_COUNT: usize = FEATURE_COLUMNS.len();

/// Iris species label
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Species {
    Setosa,
    Versicolor,
    Virginica,
}

impl Species {
    /// Canonical class order
    pub const ALL: [Species; 3] = [Species::Setosa, Species::Versicolor, Species::Virginica];

    pub fn as_str(&self) -> &'static str {
        match self {
            Species::Setosa => "setosa",
            Species::Versicolor => "versicolor",
            Species::Virginica => "virginica",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Species {
    type Err = CoreError;

    /// Accepts `setosa` as well as the UCI spelling `Iris-setosa`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let name = lowered.strip_prefix("iris-").unwrap_or(&lowered);
        match name {
            "setosa" => Ok(Species::Setosa),
            "versicolor" => Ok(Species::Versicolor),
            "virginica" => Ok(Species::Virginica),
            _ => Err(CoreError::UnknownSpecies(s.to_string())),
        }
    }
}

/// One flower measurement (centimetres)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub sepal_length: f64,
    pub sepal_width: f64,
    pub petal_length: f64,
    pub petal_width: f64,
}

impl Sample {
    pub fn new(sepal_length: f64, sepal_width: f64, petal_length: f64, petal_width: f64) -> Self {
        Self {
            sepal_length,
            sepal_width,
            petal_length,
            petal_width,
        }
    }

    /// Build a sample from values ordered as `FEATURE_COLUMNS`
    pub fn from_features(features: [f64; FEATURE_COUNT]) -> Self {
        let [sepal_length, sepal_width, petal_length, petal_width] = features;
        Self::new(sepal_length, sepal_width, petal_length, petal_width)
    }

    /// Feature vector ordered as `FEATURE_COLUMNS`
    pub fn features(&self) -> [f64; FEATURE_COUNT] {
        [
            self.sepal_length,
            self.sepal_width,
            self.petal_length,
            self.petal_width,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.features().iter().all(|v| v.is_finite())
    }
}
