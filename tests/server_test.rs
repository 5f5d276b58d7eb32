#![cfg(feature = "http")]

mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use cloud_leecher::mover::HistoryStore;
use cloud_leecher::server::{AppState, build_router};
use cloud_leecher::service::ControlService;
use cloud_leecher::source::{SourceState, SourceTask};
use common::{FakeSource, activity};

struct Fixture {
    _tmp: tempfile::TempDir,
    source: Arc<FakeSource>,
    app: Router,
}

fn fixture(api_key: Option<&str>) -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let staging = tmp.path().join("stage");
    let storage = tmp.path().join("drive");
    std::fs::create_dir_all(&staging).unwrap();
    std::fs::create_dir_all(&storage).unwrap();

    let source = FakeSource::new();
    let service = Arc::new(ControlService::new(
        source.clone(),
        Arc::new(HistoryStore::new(100)),
        activity(),
        staging,
        storage,
    ));
    let app = build_router(AppState::new(service, api_key.map(str::to_string)));
    Fixture {
        _tmp: tmp,
        source,
        app,
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health_is_open() {
    let fx = fixture(Some("key"));

    let (status, body) = send(&fx.app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "service": "CloudLeecher"}));
}

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let fx = fixture(Some("key"));

    let (status, body) = send(&fx.app, get("/api/status")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let wrong = Request::builder()
        .uri("/api/status")
        .header("x-api-key", "nope")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&fx.app, wrong).await.0, StatusCode::UNAUTHORIZED);

    let right = Request::builder()
        .uri("/api/status")
        .header("x-api-key", "key")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&fx.app, right).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source_available"], true);
}

#[tokio::test]
async fn test_preflight_skips_api_key() {
    let fx = fixture(Some("key"));
    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/download/magnet")
        .header("origin", "https://example.com")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();

    let (status, _) = send(&fx.app, preflight).await;

    assert_ne!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_open_access_without_key() {
    let fx = fixture(None);

    let (status, body) = send(&fx.app, get("/api/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["terminal"].is_array());
}

#[tokio::test]
async fn test_magnet_submission() {
    let fx = fixture(None);

    let (status, body) = send(
        &fx.app,
        post_json("/api/download/magnet", json!({"magnet": "magnet:?xt=urn:btih:abc"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(body["gid"].is_string());

    // 已有任务在运行
    let (status, body) = send(
        &fx.app,
        post_json("/api/download/magnet", json!({"magnet": "magnet:?xt=urn:btih:def"})),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].is_string());
    assert_eq!(fx.source.submit_count(), 1);
}

#[tokio::test]
async fn test_invalid_submissions_are_bad_requests() {
    let fx = fixture(None);

    let (status, _) = send(&fx.app, post_json("/api/download/magnet", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &fx.app,
        post_json("/api/download/file", json!({"torrent": "***"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&fx.app, post_json("/api/control/pause", json!({"gid": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unreachable_source_maps_to_503() {
    let fx = fixture(None);
    fx.source.set_unreachable(true);

    let (status, _) = send(
        &fx.app,
        post_json("/api/download/magnet", json!({"magnet": "magnet:?xt=urn:btih:abc"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = send(&fx.app, get("/api/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source_available"], false);
}

#[tokio::test]
async fn test_control_routes() {
    let fx = fixture(None);
    fx.source
        .push_running(SourceTask::new("g1", SourceState::Running));

    let (status, body) = send(&fx.app, post_json("/api/control/pause", json!({"gid": "g1"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "paused");

    let (status, _) = send(&fx.app, post_json("/api/control/resume", json!({"gid": "g1"}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&fx.app, post_json("/api/control/remove", json!({"gid": "g1"}))).await;
    assert_eq!(status, StatusCode::OK);
    // 再删一次仍然成功
    let (status, _) = send(&fx.app, post_json("/api/control/remove", json!({"gid": "g1"}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&fx.app, get("/api/logs")).await;
    assert_eq!(status, StatusCode::OK);
    let operations: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["operation"].as_str())
        .collect();
    assert!(operations.contains(&"pause"));
    assert!(operations.contains(&"remove"));
}

#[tokio::test]
async fn test_drive_info_and_cleanup() {
    let fx = fixture(None);
    fx.source
        .push_terminal(SourceTask::new("t", SourceState::Complete));

    let (status, body) = send(&fx.app, get("/api/drive/info")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["total"].as_u64().unwrap() > 0);

    let (status, body) = send(&fx.app, post_json("/api/cleanup", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);
    assert!(fx.source.terminal_ids().is_empty());
}
