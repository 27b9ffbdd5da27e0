//! Tracking-service backend speaking the MLflow 2.0 REST API.
//!
//! Runs are grouped by experiment name and never rewritten once finished.
//! The model is uploaded through the artifact proxy
//! (`/api/2.0/mlflow-artifacts/artifacts/...`) and registered under a
//! logical name, so the inference server can resolve the latest version
//! without knowing any run id.

use crate::errors::{Result, StoreError};
use crate::{decode_model, encode_model, ArtifactStore, LoadedModel, PublishReceipt, TrainingArtifacts};
use async_trait::async_trait;
use petal_ml_core::MetricsRecord;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use url::Url;

const API_PREFIX: &str = "api/2.0/mlflow";
const ARTIFACT_PREFIX: &str = "api/2.0/mlflow-artifacts/artifacts";
const PROXY_SCHEME: &str = "mlflow-artifacts:";

/// Artifact sub-directory holding the model files of a run
pub const MODEL_ARTIFACT_DIR: &str = "model";
pub const MODEL_ARTIFACT: &str = "model/iris_model.json";
pub const HASH_ARTIFACT: &str = "model/iris_model.hash";
pub const METRICS_ARTIFACT: &str = "metrics.json";

const RESOURCE_DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";
const RESOURCE_ALREADY_EXISTS: &str = "RESOURCE_ALREADY_EXISTS";

/// Run lifecycle states understood by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Finished,
    Failed,
}

impl RunStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
        }
    }
}

/// An open run
#[derive(Debug, Clone, PartialEq)]
pub struct RunHandle {
    pub run_id: String,
    pub experiment_id: String,
    pub artifact_uri: String,
}

/// A run as reported by the service
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run_id: String,
    pub experiment_id: String,
    pub status: String,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub artifact_uri: String,
    pub params: BTreeMap<String, String>,
    pub metrics: MetricsRecord,
}

/// One version of a registered model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

// Wire types

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Experiment {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct GetExperimentResponse {
    experiment: Experiment,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct RunInfo {
    run_id: String,
    experiment_id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    start_time: Option<i64>,
    #[serde(default)]
    end_time: Option<i64>,
    #[serde(default)]
    artifact_uri: String,
}

#[derive(Debug, Deserialize)]
struct KeyValue<V> {
    key: String,
    value: V,
}

#[derive(Debug, Default, Deserialize)]
struct RunData {
    #[serde(default)]
    params: Vec<KeyValue<String>>,
    #[serde(default)]
    metrics: Vec<KeyValue<f64>>,
}

#[derive(Debug, Deserialize)]
struct Run {
    info: RunInfo,
    #[serde(default)]
    data: RunData,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    run: Run,
}

#[derive(Debug, Deserialize)]
struct SearchRunsResponse {
    #[serde(default)]
    runs: Vec<Run>,
}

#[derive(Debug, Deserialize)]
struct ModelVersionResponse {
    model_version: ModelVersion,
}

#[derive(Debug, Deserialize)]
struct LatestVersionsResponse {
    #[serde(default)]
    model_versions: Vec<ModelVersion>,
}

impl From<Run> for RunRecord {
    fn from(run: Run) -> Self {
        let mut metrics = MetricsRecord::default();
        for metric in run.data.metrics {
            metrics.insert(metric.key, metric.value);
        }
        RunRecord {
            run_id: run.info.run_id,
            experiment_id: run.info.experiment_id,
            status: run.info.status,
            start_time: run.info.start_time,
            end_time: run.info.end_time,
            artifact_uri: run.info.artifact_uri,
            params: run
                .data
                .params
                .into_iter()
                .map(|p| (p.key, p.value))
                .collect(),
            metrics,
        }
    }
}

/// Thin client over the tracking service REST API
#[derive(Debug, Clone)]
pub struct TrackingClient {
    base: Url,
    http: Client,
}

impl TrackingClient {
    pub fn new(tracking_uri: &str) -> Result<Self> {
        let base = Url::parse(tracking_uri.trim())
            .map_err(|e| StoreError::Config(format!("invalid tracking URI {tracking_uri}: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(StoreError::Config(format!(
                "tracking URI must be http(s), got {}",
                base.scheme()
            )));
        }
        Ok(Self {
            base,
            http: Client::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Config(format!("tracking URI cannot be a base: {}", self.base)))?
            .pop_if_empty()
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn api(&self, method: &str) -> Result<Url> {
        self.endpoint(&format!("{API_PREFIX}/{method}"))
    }

    async fn post<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let url = self.api(method)?;
        debug!(%url, "tracking POST");
        let response = self.http.post(url).json(&body).send().await?;
        Self::decode(response).await
    }

    async fn delete(&self, method: &str, body: serde_json::Value) -> Result<()> {
        let url = self.api(method)?;
        debug!(%url, "tracking DELETE");
        let response = self.http.delete(url).json(&body).send().await?;
        let _: serde_json::Value = Self::decode(response).await?;
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, method: &str, query: &[(&str, &str)]) -> Result<T> {
        let mut url = self.api(method)?;
        url.query_pairs_mut().extend_pairs(query);
        debug!(%url, "tracking GET");
        let response = self.http.get(url).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        // Empty-object responses (log-param, update) still parse as `{}`.
        let body = if bytes.is_empty() { &b"{}"[..] } else { &bytes[..] };
        Ok(serde_json::from_slice(body)?)
    }

    async fn ensure_success(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let body: ApiErrorBody = serde_json::from_str(&text).unwrap_or(ApiErrorBody {
            error_code: String::new(),
            message: text,
        });
        let code = if body.error_code.is_empty() && status == StatusCode::NOT_FOUND {
            RESOURCE_DOES_NOT_EXIST.to_string()
        } else {
            body.error_code
        };
        Err(StoreError::Tracking {
            status: status.as_u16(),
            code,
            message: body.message,
        })
    }

    /// Experiment id for `name`, or `None` when it has never been created
    pub async fn experiment_id(&self, name: &str) -> Result<Option<String>> {
        match self
            .get::<GetExperimentResponse>("experiments/get-by-name", &[("experiment_name", name)])
            .await
        {
            Ok(response) => Ok(Some(response.experiment.experiment_id)),
            Err(err) if is_missing(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn get_or_create_experiment(&self, name: &str) -> Result<String> {
        if let Some(id) = self.experiment_id(name).await? {
            return Ok(id);
        }
        info!(experiment = name, "creating experiment");
        let created: CreateExperimentResponse = self
            .post("experiments/create", json!({ "name": name }))
            .await?;
        Ok(created.experiment_id)
    }

    /// Open a new run under `experiment_name`, creating the experiment if needed
    pub async fn start_run(&self, experiment_name: &str) -> Result<RunHandle> {
        let experiment_id = self.get_or_create_experiment(experiment_name).await?;
        let response: RunResponse = self
            .post(
                "runs/create",
                json!({
                    "experiment_id": experiment_id,
                    "start_time": now_millis(),
                }),
            )
            .await?;
        let info = response.run.info;
        info!(run_id = %info.run_id, experiment = experiment_name, "run started");
        Ok(RunHandle {
            run_id: info.run_id,
            experiment_id: info.experiment_id,
            artifact_uri: info.artifact_uri,
        })
    }

    pub async fn log_param(&self, run: &RunHandle, key: &str, value: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                "runs/log-parameter",
                json!({ "run_id": run.run_id, "key": key, "value": value }),
            )
            .await?;
        Ok(())
    }

    pub async fn log_metric(&self, run: &RunHandle, key: &str, value: f64) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                "runs/log-metric",
                json!({
                    "run_id": run.run_id,
                    "key": key,
                    "value": value,
                    "timestamp": now_millis(),
                    "step": 0,
                }),
            )
            .await?;
        Ok(())
    }

    /// Upload one file under the run's artifact root
    pub async fn log_artifact(&self, run: &RunHandle, path: &str, bytes: Vec<u8>) -> Result<()> {
        let url = self.artifact_url(&run.artifact_uri, path)?;
        debug!(%url, size = bytes.len(), "uploading artifact");
        let response = self.http.put(url).body(bytes).send().await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Download one file from a run's artifact root
    pub async fn download_artifact(&self, artifact_uri: &str, path: &str) -> Result<Vec<u8>> {
        let url = self.artifact_url(artifact_uri, path)?;
        let response = self.http.get(url.clone()).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(url.to_string()));
        }
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn finish_run(&self, run: &RunHandle, status: RunStatus) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                "runs/update",
                json!({
                    "run_id": run.run_id,
                    "status": status.as_str(),
                    "end_time": now_millis(),
                }),
            )
            .await?;
        info!(run_id = %run.run_id, status = status.as_str(), "run finalized");
        Ok(())
    }

    /// Register the run's model under `name`; the name is created on first use
    pub async fn register_model(&self, run: &RunHandle, name: &str) -> Result<ModelVersion> {
        match self
            .post::<serde_json::Value>("registered-models/create", json!({ "name": name }))
            .await
        {
            Ok(_) => info!(model = name, "registered model created"),
            Err(StoreError::Tracking { code, .. }) if code == RESOURCE_ALREADY_EXISTS => {}
            Err(err) => return Err(err),
        }

        let source = format!(
            "{}/{}",
            run.artifact_uri.trim_end_matches('/'),
            MODEL_ARTIFACT_DIR
        );
        let response: ModelVersionResponse = self
            .post(
                "model-versions/create",
                json!({ "name": name, "source": source, "run_id": run.run_id }),
            )
            .await?;
        info!(
            model = name,
            version = %response.model_version.version,
            "model version registered"
        );
        Ok(response.model_version)
    }

    /// Remove one version of a registered model
    pub async fn delete_model_version(&self, name: &str, version: &str) -> Result<()> {
        self.delete(
            "model-versions/delete",
            json!({ "name": name, "version": version }),
        )
        .await?;
        info!(model = name, version, "model version deleted");
        Ok(())
    }

    pub async fn get_run(&self, run_id: &str) -> Result<RunRecord> {
        let response: RunResponse = self.get("runs/get", &[("run_id", run_id)]).await?;
        Ok(response.run.into())
    }

    /// Most recent run of `experiment_name`; `None` if it has no runs or does not exist
    pub async fn latest_run(&self, experiment_name: &str) -> Result<Option<RunRecord>> {
        let Some(experiment_id) = self.experiment_id(experiment_name).await? else {
            return Ok(None);
        };
        let response: SearchRunsResponse = self
            .post(
                "runs/search",
                json!({
                    "experiment_ids": [experiment_id],
                    "filter": "attributes.status = 'FINISHED'",
                    "max_results": 1,
                    "order_by": ["attributes.start_time DESC"],
                }),
            )
            .await?;
        Ok(response.runs.into_iter().next().map(RunRecord::from))
    }

    /// Highest registered version of `name`, or `None` if nothing is registered
    pub async fn latest_model_version(&self, name: &str) -> Result<Option<ModelVersion>> {
        let response = self
            .post::<LatestVersionsResponse>(
                "registered-models/get-latest-versions",
                json!({ "name": name }),
            )
            .await;
        match response {
            Ok(response) => Ok(response
                .model_versions
                .into_iter()
                .max_by_key(|v| v.version.parse::<u64>().unwrap_or(0))),
            Err(err) if is_missing(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn artifact_url(&self, artifact_uri: &str, path: &str) -> Result<Url> {
        let root = proxied_artifact_root(artifact_uri)?;
        self.endpoint(&format!("{ARTIFACT_PREFIX}/{root}/{path}"))
    }
}

/// Path below the artifact proxy for an `mlflow-artifacts:` URI
fn proxied_artifact_root(artifact_uri: &str) -> Result<String> {
    let rest = artifact_uri.strip_prefix(PROXY_SCHEME).ok_or_else(|| {
        StoreError::Config(format!(
            "run artifacts at {artifact_uri} are not served through the tracking artifact proxy"
        ))
    })?;
    // `mlflow-artifacts://host/path` carries an authority; `mlflow-artifacts:/path` does not.
    let path = match rest.strip_prefix("//") {
        Some(with_host) => with_host.split_once('/').map(|(_, p)| p).unwrap_or(""),
        None => rest,
    };
    Ok(path.trim_matches('/').to_string())
}

fn is_missing(err: &StoreError) -> bool {
    matches!(err, StoreError::Tracking { code, .. } if code == RESOURCE_DOES_NOT_EXIST)
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// [`ArtifactStore`] over a tracking service
#[derive(Debug, Clone)]
pub struct TrackingStore {
    client: TrackingClient,
    experiment_name: String,
    registered_model: String,
}

impl TrackingStore {
    pub fn new(client: TrackingClient, experiment_name: String, registered_model: String) -> Self {
        Self {
            client,
            experiment_name,
            registered_model,
        }
    }

    pub fn client(&self) -> &TrackingClient {
        &self.client
    }

    async fn record_run(
        &self,
        run: &RunHandle,
        artifacts: &TrainingArtifacts,
    ) -> Result<(String, ModelVersion)> {
        for (key, value) in &artifacts.params {
            self.client.log_param(run, key, value).await?;
        }
        for (key, value) in artifacts.metrics.iter() {
            self.client.log_metric(run, key, value).await?;
        }

        let (model_json, model_hash) = encode_model(&artifacts.model)?;
        let metrics_json = serde_json::to_vec_pretty(&artifacts.metrics)?;
        self.client
            .log_artifact(run, MODEL_ARTIFACT, model_json.into_bytes())
            .await?;
        self.client
            .log_artifact(run, HASH_ARTIFACT, model_hash.clone().into_bytes())
            .await?;
        self.client
            .log_artifact(run, METRICS_ARTIFACT, metrics_json)
            .await?;

        let version = self.client.register_model(run, &self.registered_model).await?;
        Ok((model_hash, version))
    }
}

#[async_trait]
impl ArtifactStore for TrackingStore {
    async fn publish(&self, artifacts: &TrainingArtifacts) -> Result<PublishReceipt> {
        let run = self.client.start_run(&self.experiment_name).await?;

        let err = match self.record_run(&run, artifacts).await {
            Ok((model_hash, version)) => match self.client.finish_run(&run, RunStatus::Finished).await {
                Ok(()) => {
                    return Ok(PublishReceipt {
                        location: format!("{}/{}", self.client.base_url(), run.run_id),
                        model_hash,
                        run_id: Some(run.run_id),
                        model_version: Some(version.version),
                    })
                }
                Err(err) => {
                    // An unfinished run must not stay resolvable through the registry.
                    if let Err(delete_err) = self
                        .client
                        .delete_model_version(&version.name, &version.version)
                        .await
                    {
                        warn!(
                            model = %version.name,
                            version = %version.version,
                            error = %delete_err,
                            "could not delete model version of unfinished run"
                        );
                    }
                    err
                }
            },
            Err(err) => err,
        };

        if let Err(mark_err) = self.client.finish_run(&run, RunStatus::Failed).await {
            warn!(run_id = %run.run_id, error = %mark_err, "could not mark run as failed");
        }
        Err(err)
    }

    async fn load_model(&self) -> Result<LoadedModel> {
        let version = self
            .client
            .latest_model_version(&self.registered_model)
            .await?
            .ok_or_else(|| {
                StoreError::NotFound(format!("registered model {}", self.registered_model))
            })?;
        let run_id = version.run_id.as_deref().ok_or_else(|| {
            StoreError::NotFound(format!(
                "run for {} version {}",
                version.name, version.version
            ))
        })?;

        let run = self.client.get_run(run_id).await?;
        let bytes = self
            .client
            .download_artifact(&run.artifact_uri, MODEL_ARTIFACT)
            .await?;
        let expected = match self
            .client
            .download_artifact(&run.artifact_uri, HASH_ARTIFACT)
            .await
        {
            Ok(hash) => Some(String::from_utf8_lossy(&hash).into_owned()),
            Err(StoreError::NotFound(_)) => None,
            Err(err) => return Err(err),
        };

        let (model, hash) = decode_model(&bytes, expected.as_deref())?;
        info!(
            model = %version.name,
            version = %version.version,
            run_id,
            "resolved registered model"
        );
        Ok(LoadedModel {
            model,
            hash,
            source: format!("models:/{}/{}", version.name, version.version),
        })
    }

    async fn load_metrics(&self) -> Result<MetricsRecord> {
        let run = self
            .client
            .latest_run(&self.experiment_name)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("runs in experiment {}", self.experiment_name)))?;
        Ok(run.metrics)
    }

    fn describe(&self) -> String {
        format!(
            "tracking ({}, experiment {})",
            self.client.base_url(),
            self.experiment_name
        )
    }
}
