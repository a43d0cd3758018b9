#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use renderfarm_core::assignment::AssignmentPolicy;
use renderfarm_db::memory::MemoryJobStore;
use renderfarm_db::store::JobStore;
use tower::ServiceExt;

use renderfarm_api::config::ServerConfig;
use renderfarm_api::router::build_app_router;
use renderfarm_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        database_url: None,
        assignment_policy: "manual".to_string(),
        worker_pool: Vec::new(),
    }
}

/// Build the full application router over a fresh in-memory store, with
/// the same middleware stack production uses.
pub fn build_test_app(policy: AssignmentPolicy) -> (Router, Arc<MemoryJobStore>) {
    let store = Arc::new(MemoryJobStore::new());
    let config = test_config();
    let state = AppState::new(
        Arc::clone(&store) as Arc<dyn JobStore>,
        policy,
        config.clone(),
    );
    (build_app_router(state, &config), store)
}

/// Router with the manual assignment policy.
pub fn manual_app() -> (Router, Arc<MemoryJobStore>) {
    build_test_app(AssignmentPolicy::Manual)
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    json_request(app, Method::POST, uri, body).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    json_request(app, Method::PUT, uri, body).await
}

pub async fn put_text(app: Router, uri: &str, body: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::PUT)
        .uri(uri)
        .header("content-type", "text/plain")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn json_request(
    app: Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// A valid render request body.
pub fn render_request(name: &str, worker: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "name": name,
        "owner": "A",
        "map_ref": "/Game/Maps/Main",
        "sequence_ref": "/Game/Cinematics/Shot010",
        "config_ref": "/Game/Configs/HighQuality",
    });
    if let Some(worker) = worker {
        body["worker"] = worker.into();
    }
    body
}
