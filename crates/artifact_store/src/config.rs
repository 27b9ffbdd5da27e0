//! Artifact store configuration
//!
//! Defaults → optional `[store]` table from the trainer TOML → environment.

use crate::errors::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Address of the tracking service; required for the tracking backend only
pub const TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";
pub const BACKEND_ENV: &str = "PETAL_ARTIFACT_BACKEND";
pub const ARTIFACT_DIR_ENV: &str = "PETAL_ARTIFACT_DIR";
pub const EXPERIMENT_ENV: &str = "PETAL_EXPERIMENT_NAME";
pub const REGISTERED_MODEL_ENV: &str = "PETAL_REGISTERED_MODEL";

pub const DEFAULT_EXPERIMENT: &str = "iris-classification";
pub const DEFAULT_REGISTERED_MODEL: &str = "iris-classifier";

/// Which backend holds the artifacts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Tracking,
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "file" | "fs" => Ok(BackendKind::Local),
            "tracking" | "remote" | "mlflow" => Ok(BackendKind::Tracking),
            other => Err(StoreError::Config(format!("unknown artifact backend: {other}"))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => f.write_str("local"),
            BackendKind::Tracking => f.write_str("tracking"),
        }
    }
}

/// Store settings shared by the trainer and the inference server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// Directory for the local backend's files
    pub artifact_dir: PathBuf,
    pub tracking_uri: Option<String>,
    pub experiment_name: String,
    pub registered_model: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            artifact_dir: PathBuf::from("."),
            tracking_uri: None,
            experiment_name: DEFAULT_EXPERIMENT.to_string(),
            registered_model: DEFAULT_REGISTERED_MODEL.to_string(),
        }
    }
}

impl StoreConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup; blank values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = get(BACKEND_ENV) {
            self.backend = value.parse()?;
        }
        if let Some(value) = get(ARTIFACT_DIR_ENV) {
            self.artifact_dir = PathBuf::from(value);
        }
        if let Some(value) = get(TRACKING_URI_ENV) {
            self.tracking_uri = Some(value);
        }
        if let Some(value) = get(EXPERIMENT_ENV) {
            self.experiment_name = value;
        }
        if let Some(value) = get(REGISTERED_MODEL_ENV) {
            self.registered_model = value;
        }
        Ok(())
    }

    /// Tracking URI, or a configuration error when it is unset
    pub fn require_tracking_uri(&self) -> Result<&str> {
        self.tracking_uri.as_deref().ok_or_else(|| {
            StoreError::Config(format!(
                "{TRACKING_URI_ENV} must be set when using the tracking backend"
            ))
        })
    }

    /// Check the settings the selected backend depends on
    pub fn validate(&self) -> Result<()> {
        match self.backend {
            BackendKind::Local => Ok(()),
            BackendKind::Tracking => {
                self.require_tracking_uri()?;
                if self.experiment_name.trim().is_empty() {
                    return Err(StoreError::Config("experiment name is empty".into()));
                }
                if self.registered_model.trim().is_empty() {
                    return Err(StoreError::Config("registered model name is empty".into()));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_use_local_backend() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, BackendKind::Local);
        assert_eq!(config.artifact_dir, PathBuf::from("."));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tracking_backend_requires_uri() {
        let mut config = StoreConfig::default();
        config
            .apply_overrides(lookup(&[(BACKEND_ENV, "tracking")]))
            .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
        assert!(err.to_string().contains(TRACKING_URI_ENV));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = StoreConfig::default();
        config
            .apply_overrides(lookup(&[
                (BACKEND_ENV, "mlflow"),
                (TRACKING_URI_ENV, " http://tracking:5000 "),
                (EXPERIMENT_ENV, "nightly"),
                (ARTIFACT_DIR_ENV, ""),
            ]))
            .unwrap();

        assert_eq!(config.backend, BackendKind::Tracking);
        assert_eq!(config.tracking_uri.as_deref(), Some("http://tracking:5000"));
        assert_eq!(config.experiment_name, "nightly");
        assert_eq!(config.artifact_dir, PathBuf::from("."));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let mut config = StoreConfig::default();
        let err = config
            .apply_overrides(lookup(&[(BACKEND_ENV, "s3")]))
            .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }
}
