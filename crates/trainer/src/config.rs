//! Trainer configuration
//!
//! Built-in defaults, then an optional TOML file, then environment
//! overrides. CLI flags are applied last by the binary.

use crate::errors::TrainerError;
use crate::trainer::TrainingParams;
use petal_artifact_store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Picked up from the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "petal.toml";
pub const DEFAULT_DATASET: &str = "data/iris.csv";

pub const DATASET_ENV: &str = "PETAL_DATASET";
pub const SEED_ENV: &str = "PETAL_SEED";
pub const TEST_SIZE_ENV: &str = "PETAL_TEST_SIZE";
pub const MAX_ITER_ENV: &str = "PETAL_MAX_ITER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub dataset: PathBuf,
    pub training: TrainingParams,
    pub store: StoreConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from(DEFAULT_DATASET),
            training: TrainingParams::default(),
            store: StoreConfig::default(),
        }
    }
}

impl TrainerConfig {
    /// Resolve configuration from `path` (or `petal.toml` if present) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, TrainerError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, TrainerError> {
        let content = fs::read_to_string(path).map_err(|e| {
            TrainerError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, TrainerError> {
        toml::from_str(content)
            .map_err(|e| TrainerError::Config(format!("failed to parse config file: {e}")))
    }

    /// Apply overrides from an arbitrary key lookup; blank values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), TrainerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = get(DATASET_ENV) {
            self.dataset = PathBuf::from(value);
        }
        if let Some(value) = get(SEED_ENV) {
            self.training.seed = parse_env(SEED_ENV, &value)?;
        }
        if let Some(value) = get(TEST_SIZE_ENV) {
            self.training.test_size = parse_env(TEST_SIZE_ENV, &value)?;
        }
        if let Some(value) = get(MAX_ITER_ENV) {
            self.training.model.max_iter = parse_env(MAX_ITER_ENV, &value)?;
        }
        self.store.apply_overrides(&lookup)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), TrainerError> {
        self.training.validate()?;
        self.store.validate()?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, TrainerError> {
    value
        .parse()
        .map_err(|_| TrainerError::Config(format!("{key}: cannot parse {value:?}")))
}
