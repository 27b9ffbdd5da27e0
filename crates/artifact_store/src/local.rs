//! Filesystem backend: fixed file names inside one directory.

use crate::errors::{Result, StoreError};
use crate::{decode_model, encode_model, ArtifactStore, LoadedModel, PublishReceipt, TrainingArtifacts};
use async_trait::async_trait;
use petal_ml_core::MetricsRecord;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub const MODEL_FILE: &str = "iris_model.json";
pub const HASH_FILE: &str = "iris_model.hash";
pub const METRICS_FILE: &str = "metrics.json";

/// Local artifact directory
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    pub fn hash_path(&self) -> PathBuf {
        self.dir.join(HASH_FILE)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join(METRICS_FILE)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(format!(
                "{} (has the trainer run?)",
                path.display()
            ))),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// Stage every file next to its target, then rename them into place.
    /// Nothing is replaced unless all files were staged.
    async fn write_all(&self, files: Vec<(PathBuf, Vec<u8>)>) -> Result<()> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut staged = Vec::with_capacity(files.len());
            for (target, bytes) in files {
                let mut file = NamedTempFile::new_in(&dir)?;
                file.write_all(&bytes)?;
                file.as_file().sync_all()?;
                staged.push((file, target));
            }
            for (file, target) in staged {
                file.persist(&target).map_err(|err| err.error)?;
            }
            Ok(())
        })
        .await
        .map_err(|err| StoreError::Io(std::io::Error::other(err)))?
    }

    async fn read_optional(&self, path: &Path) -> Result<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Io(err)),
        }
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    async fn publish(&self, artifacts: &TrainingArtifacts) -> Result<PublishReceipt> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let (model_json, model_hash) = encode_model(&artifacts.model)?;
        let metrics_json = serde_json::to_string_pretty(&artifacts.metrics)?;

        self.write_all(vec![
            (self.metrics_path(), metrics_json.into_bytes()),
            (self.model_path(), model_json.into_bytes()),
            (self.hash_path(), model_hash.clone().into_bytes()),
        ])
        .await?;

        info!(
            model = %self.model_path().display(),
            metrics = %self.metrics_path().display(),
            hash = %model_hash,
            "artifacts written"
        );

        Ok(PublishReceipt {
            location: self.dir.display().to_string(),
            model_hash,
            run_id: None,
            model_version: None,
        })
    }

    async fn load_model(&self) -> Result<LoadedModel> {
        let path = self.model_path();
        let bytes = self.read(&path).await?;
        let expected = self.read_optional(&self.hash_path()).await?;
        if expected.is_none() {
            debug!(path = %path.display(), "no hash file, skipping digest check");
        }

        let (model, hash) = decode_model(&bytes, expected.as_deref())?;
        Ok(LoadedModel {
            model,
            hash,
            source: path.display().to_string(),
        })
    }

    async fn load_metrics(&self) -> Result<MetricsRecord> {
        let bytes = self.read(&self.metrics_path()).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn describe(&self) -> String {
        format!("local ({})", self.dir.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use petal_ml_core::{LogisticRegression, Sample, Species};
    use std::collections::BTreeMap;

    fn artifacts() -> TrainingArtifacts {
        let samples = vec![
            Sample::new(5.1, 3.5, 1.4, 0.2),
            Sample::new(4.9, 3.0, 1.4, 0.2),
            Sample::new(7.0, 3.2, 4.7, 1.4),
            Sample::new(6.4, 3.2, 4.5, 1.5),
            Sample::new(6.3, 3.3, 6.0, 2.5),
            Sample::new(7.1, 3.0, 5.9, 2.1),
        ];
        let labels = vec![
            Species::Setosa,
            Species::Setosa,
            Species::Versicolor,
            Species::Versicolor,
            Species::Virginica,
            Species::Virginica,
        ];
        let model = LogisticRegression::default().fit(&samples, &labels).unwrap();
        let mut params = BTreeMap::new();
        params.insert("solver".to_string(), "newton".to_string());
        TrainingArtifacts {
            model,
            metrics: MetricsRecord::new(1.0),
            params,
        }
    }

    #[tokio::test]
    async fn test_publish_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let artifacts = artifacts();

        let receipt = store.publish(&artifacts).await.unwrap();
        assert!(store.model_path().exists());
        assert!(store.metrics_path().exists());

        let loaded = store.load_model().await.unwrap();
        assert_eq!(loaded.model, artifacts.model);
        assert_eq!(loaded.hash, receipt.model_hash);

        let metrics = store.load_metrics().await.unwrap();
        assert_eq!(metrics.accuracy(), Some(1.0));
    }

    #[tokio::test]
    async fn test_missing_artifacts_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        assert!(matches!(store.load_model().await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.load_metrics().await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_tampered_model_fails_hash_check() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.publish(&artifacts()).await.unwrap();

        let mut text = std::fs::read_to_string(store.model_path()).unwrap();
        text.push('\n');
        std::fs::write(store.model_path(), text).unwrap();

        let err = store.load_model().await.unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch { .. }));
    }

    #[tokio::test]
    async fn test_garbage_model_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        std::fs::write(store.model_path(), b"not json").unwrap();

        let err = store.load_model().await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_publish_overwrites_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let mut artifacts = artifacts();
        store.publish(&artifacts).await.unwrap();

        artifacts.metrics = MetricsRecord::new(0.5);
        store.publish(&artifacts).await.unwrap();

        assert_eq!(store.load_metrics().await.unwrap().accuracy(), Some(0.5));
    }

    #[tokio::test]
    async fn test_failed_publish_keeps_previous_model() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let first = artifacts();
        store.publish(&first).await.unwrap();

        // A directory in place of the metrics file makes the first rename fail.
        std::fs::remove_file(store.metrics_path()).unwrap();
        std::fs::create_dir(store.metrics_path()).unwrap();

        let mut second = artifacts();
        second.model.intercepts[0] += 1.0;
        assert!(store.publish(&second).await.is_err());

        let loaded = store.load_model().await.unwrap();
        assert_eq!(loaded.model, first.model);

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![HASH_FILE, MODEL_FILE, METRICS_FILE]);
    }
}
