//! Router tests against a model trained on the bundled iris data

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use petal_artifact_store::{ArtifactStore, LocalStore, StoreConfig, StoreError};
use petal_inference::{create_router, load_model, PredictResponse, ROOT_MESSAGE};
use petal_trainer::{train_model_from_csv, TrainingParams};
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;
use tower::ServiceExt;

const IRIS_CSV: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../data/iris.csv");

async fn test_app() -> Router {
    let outcome = train_model_from_csv(Path::new(IRIS_CSV), TrainingParams::default()).unwrap();
    let dir = TempDir::new().unwrap();
    LocalStore::new(dir.path())
        .publish(&outcome.to_artifacts())
        .await
        .unwrap();

    let config = StoreConfig {
        artifact_dir: dir.path().to_path_buf(),
        ..StoreConfig::default()
    };
    create_router(load_model(&config).await.unwrap())
}

fn predict_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_root_reports_status() {
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let (status, body) = send(test_app().await, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], ROOT_MESSAGE);
}

#[tokio::test]
async fn test_predict_setosa() {
    let request = predict_request(
        r#"{"sepal_length": 5.1, "sepal_width": 3.5, "petal_length": 1.4, "petal_width": 0.2}"#,
    );
    let (status, body) = send(test_app().await, request).await;

    assert_eq!(status, StatusCode::OK);
    let response: PredictResponse = serde_json::from_value(body).unwrap();
    assert_eq!(response.species_prediction, "setosa");
}

#[tokio::test]
async fn test_predict_virginica() {
    let request = predict_request(
        r#"{"sepal_length": 7.7, "sepal_width": 3.0, "petal_length": 6.1, "petal_width": 2.3}"#,
    );
    let (status, body) = send(test_app().await, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["species_prediction"], "virginica");
}

#[tokio::test]
async fn test_missing_field_is_unprocessable() {
    let request =
        predict_request(r#"{"sepal_length": 5.1, "sepal_width": 3.5, "petal_length": 1.4}"#);
    let (status, body) = send(test_app().await, request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("petal_width"));
}

#[tokio::test]
async fn test_extra_field_is_unprocessable() {
    let request = predict_request(
        r#"{"sepal_length": 5.1, "sepal_width": 3.5, "petal_length": 1.4, "petal_width": 0.2, "stem_length": 9.0}"#,
    );
    let (status, body) = send(test_app().await, request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("stem_length"));
}

#[tokio::test]
async fn test_wrong_type_is_unprocessable() {
    let request = predict_request(
        r#"{"sepal_length": "long", "sepal_width": 3.5, "petal_length": 1.4, "petal_width": 0.2}"#,
    );
    let (status, _) = send(test_app().await, request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let request = predict_request(r#"{"sepal_length": 5.1,"#);
    let (status, body) = send(test_app().await, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_missing_content_type_is_rejected() {
    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .body(Body::from(
            r#"{"sepal_length": 5.1, "sepal_width": 3.5, "petal_length": 1.4, "petal_width": 0.2}"#,
        ))
        .unwrap();
    let (status, _) = send(test_app().await, request).await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_bad_request_does_not_affect_later_requests() {
    let app = test_app().await;

    let (status, _) = send(app.clone(), predict_request("not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        app,
        predict_request(
            r#"{"sepal_length": 5.1, "sepal_width": 3.5, "petal_length": 1.4, "petal_width": 0.2}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["species_prediction"], "setosa");
}

#[tokio::test]
async fn test_startup_fails_without_model() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        artifact_dir: dir.path().to_path_buf(),
        ..StoreConfig::default()
    };

    let err = load_model(&config).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}
