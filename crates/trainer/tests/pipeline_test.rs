//! End-to-end tests for the training pipeline on the bundled iris data

use anyhow::Result;
use petal_artifact_store::{ArtifactStore, LocalStore};
use petal_ml_core::serialization::canonical_json_string;
use petal_ml_core::{Sample, Species, FEATURE_COLUMNS, LABEL_COLUMN};
use petal_trainer::{
    run_training, train_model_from_csv, Dataset, TrainerConfig, TrainerError, TrainingParams,
};
use std::io::Write;
use std::path::Path;
use tempfile::{NamedTempFile, TempDir};

const IRIS_CSV: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../data/iris.csv");

fn iris() -> Result<Dataset> {
    Ok(Dataset::from_csv(IRIS_CSV)?)
}

#[test]
fn test_bundled_dataset_shape() -> Result<()> {
    let dataset = iris()?;

    let mut expected: Vec<&str> = FEATURE_COLUMNS.to_vec();
    expected.push(LABEL_COLUMN);
    assert_eq!(dataset.columns(), expected.as_slice());
    assert_eq!(dataset.missing_values(), 0);
    assert_eq!(dataset.len(), 150);

    let counts = dataset.class_counts();
    for species in Species::ALL {
        assert_eq!(counts[&species], 50, "{species} count");
    }
    Ok(())
}

#[test]
fn test_split_keeps_class_balance() -> Result<()> {
    let (train, test) = iris()?.stratified_split(0.2, 42)?;
    assert_eq!(train.len(), 120);
    assert_eq!(test.len(), 30);
    for species in Species::ALL {
        assert_eq!(test.class_counts()[&species], 10);
    }
    Ok(())
}

#[test]
fn test_deterministic_training() -> Result<()> {
    let path = Path::new(IRIS_CSV);
    let first = train_model_from_csv(path, TrainingParams::default())?;
    let second = train_model_from_csv(path, TrainingParams::default())?;

    assert_eq!(
        canonical_json_string(&first.model)?,
        canonical_json_string(&second.model)?,
        "Serialized models should be identical"
    );
    assert_eq!(first.metrics, second.metrics);
    Ok(())
}

#[test]
fn test_accuracy_threshold() -> Result<()> {
    let outcome = train_model_from_csv(Path::new(IRIS_CSV), TrainingParams::default())?;
    let accuracy = outcome.accuracy();
    assert!(accuracy >= 0.8, "accuracy {accuracy} below threshold");
    assert!(accuracy <= 1.0);
    Ok(())
}

#[test]
fn test_reference_sample_is_setosa() -> Result<()> {
    let outcome = train_model_from_csv(Path::new(IRIS_CSV), TrainingParams::default())?;
    let sample = Sample::new(5.1, 3.5, 1.4, 0.2);
    assert_eq!(outcome.model.predict(&sample), Species::Setosa);
    Ok(())
}

#[tokio::test]
async fn test_model_survives_local_store() -> Result<()> {
    let outcome = train_model_from_csv(Path::new(IRIS_CSV), TrainingParams::default())?;
    let dir = TempDir::new()?;
    let store = LocalStore::new(dir.path());

    store.publish(&outcome.to_artifacts()).await?;
    let loaded = store.load_model().await?;

    assert_eq!(loaded.model, outcome.model);
    let sample = Sample::new(6.7, 3.0, 5.2, 2.3);
    assert_eq!(loaded.model.predict(&sample), outcome.model.predict(&sample));

    let metrics = store.load_metrics().await?;
    assert_eq!(metrics.accuracy(), Some(outcome.accuracy()));
    Ok(())
}

#[tokio::test]
async fn test_run_training_writes_artifacts() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = TrainerConfig::default();
    config.dataset = IRIS_CSV.into();
    config.store.artifact_dir = dir.path().to_path_buf();

    let store = LocalStore::new(dir.path());
    let (outcome, receipt) = run_training(&config, &store).await?;

    assert!(store.model_path().exists());
    assert!(store.hash_path().exists());
    assert!(store.metrics_path().exists());
    assert_eq!(receipt.run_id, None);
    assert_eq!(
        receipt.model_hash,
        std::fs::read_to_string(store.hash_path())?.trim()
    );
    assert!(outcome.accuracy() >= 0.8);
    Ok(())
}

#[test]
fn test_malformed_dataset_is_rejected() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "sepal_length,sepal_width,petal_length,petal_width,species")?;
    writeln!(file, "5.1,3.5,1.4,0.2,setosa")?;
    writeln!(file, "4.9,abc,1.4,0.2,setosa")?;
    file.flush()?;

    let err = train_model_from_csv(file.path(), TrainingParams::default()).unwrap_err();
    assert!(matches!(err, TrainerError::Dataset(_)), "unexpected error: {err}");
    Ok(())
}

#[test]
fn test_iteration_cap_fails_training() {
    let mut params = TrainingParams::default();
    params.model.max_iter = 1;
    params.model.tol = 1e-12;

    let err = train_model_from_csv(Path::new(IRIS_CSV), params).unwrap_err();
    assert!(err.is_convergence(), "unexpected error: {err}");
}
