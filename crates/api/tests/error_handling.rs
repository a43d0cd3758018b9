//! Tests for `AppError` -> HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no server needed.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use http_body_util::BodyExt;
use renderfarm_api::error::AppError;
use renderfarm_core::error::CoreError;
use renderfarm_core::status::RenderStatus;
use renderfarm_core::types::new_job_uid;
use renderfarm_db::models::render_job::{NewRenderJob, RenderJob};
use renderfarm_db::store::StoreError;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ---------------------------------------------------------------------------
// Test: validation errors map to 400 VALIDATION_ERROR
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validation_error_returns_400() {
    let (status, json) =
        error_to_response(AppError::Core(CoreError::Validation("name: blank".into()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "name: blank");

    let (status, json) =
        error_to_response(AppError::Store(StoreError::Validation("bad worker".into()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

// ---------------------------------------------------------------------------
// Test: store error taxonomy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_key_returns_409() {
    let (status, json) =
        error_to_response(AppError::Store(StoreError::DuplicateKey(new_job_uid()))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "DUPLICATE_KEY");
}

#[tokio::test]
async fn not_found_returns_404() {
    let uid = new_job_uid();
    let (status, json) = error_to_response(AppError::Store(StoreError::NotFound(uid))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], format!("Render job {uid} not found"));
}

#[tokio::test]
async fn invalid_transition_returns_422() {
    let err = AppError::Store(StoreError::InvalidTransition {
        from: RenderStatus::Finished,
        to: RenderStatus::InProgress,
    });
    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn unavailable_store_returns_503_without_details() {
    let err = AppError::Store(StoreError::Unavailable("10.0.0.5:5432 refused".into()));
    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "STORE_UNAVAILABLE");
    assert!(!json["error"].as_str().unwrap().contains("10.0.0.5"));
}

// ---------------------------------------------------------------------------
// Test: status conflict carries the current record
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_conflict_includes_current_record() {
    let mut job = RenderJob::submitted(
        NewRenderJob {
            uid: new_job_uid(),
            name: "render01".into(),
            owner: "A".into(),
            map_ref: "map".into(),
            sequence_ref: "seq".into(),
            config_ref: "cfg".into(),
            worker: Some("W1".into()),
        },
        Utc::now(),
    );
    job.status = RenderStatus::Error;

    let (status, json) = error_to_response(AppError::StatusConflict(Box::new(job))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "STATUS_CONFLICT");
    assert_eq!(json["current"]["status"], "error");
    assert_eq!(json["current"]["worker"], "W1");
}

// ---------------------------------------------------------------------------
// Test: internal errors are sanitized
// ---------------------------------------------------------------------------

#[tokio::test]
async fn internal_error_returns_500_and_sanitizes_message() {
    let err = AppError::InternalError("secret database credentials leaked".into());
    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}
