//! HTTP routes and the WebSocket stream

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use pulsewire::{
    actors::{Broadcaster, HubHandle, Snapshot},
    api::{ApiState, router, spawn_api_server},
    config::{ApiSettings, ConnectionConfig},
    metrics::MetricKind,
    storage::{MemoryBackend, StorageBackend},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Message, client::IntoClientRequest, http::HeaderValue},
};
use tower::ServiceExt;

use crate::helpers::{FailingStore, hub_with_mailbox, measurement_at, wait_for_active};

fn settings(token: Option<&str>, origins: &[&str]) -> ApiSettings {
    ApiSettings {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        auth_token: token.map(str::to_string),
        allowed_origins: origins.iter().map(|o| o.to_string()).collect(),
    }
}

fn state(hub: &HubHandle, store: Arc<dyn StorageBackend>, settings: ApiSettings) -> ApiState {
    ApiState::new(hub.clone(), store, ConnectionConfig::default(), settings)
}

async fn get(state: ApiState, uri: &str, token: Option<&str>) -> (StatusCode, serde_json::Value) {
    let mut request = Request::builder().uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let response = router(state)
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_reports_storage_and_subscribers() {
    let hub = hub_with_mailbox(4);
    let _subscription = hub.subscribe().await;
    wait_for_active(&hub, 1).await;

    let (status, body) = get(
        state(&hub, Arc::new(MemoryBackend::new()), settings(None, &[])),
        "/api/v1/health",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["subscribers"], 1);

    let (_, body) = get(
        state(&hub, Arc::new(FailingStore), settings(None, &[])),
        "/api/v1/health",
        None,
    )
    .await;
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_current_and_summary() {
    let hub = hub_with_mailbox(4);
    let store = Arc::new(MemoryBackend::new());
    let now = Utc::now();
    store
        .save_batch(&[
            measurement_at(MetricKind::Cpu, 40.0, now - chrono::Duration::minutes(3)),
            measurement_at(MetricKind::Cpu, 80.0, now - chrono::Duration::minutes(2)),
            measurement_at(MetricKind::Cpu, 96.0, now - chrono::Duration::minutes(1)),
        ])
        .await
        .unwrap();

    let (status, body) = get(
        state(&hub, store.clone(), settings(None, &[])),
        "/api/v1/metrics/current",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metrics"]["cpu"]["value"], 96.0);
    assert_eq!(body["metrics"]["cpu"]["status"], "critical");

    let (status, body) = get(
        state(&hub, store.clone(), settings(None, &[])),
        "/api/v1/metrics/cpu/summary?minutes=10",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
    assert_eq!(body["min"], 40.0);
    assert_eq!(body["max"], 96.0);
    assert_eq!(body["warning_count"], 1);
    assert_eq!(body["critical_count"], 1);
    assert_eq!(body["unit"], "%");

    let (status, _) = get(
        state(&hub, store.clone(), settings(None, &[])),
        "/api/v1/metrics/disk/summary",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(
        state(&hub, store, settings(None, &[])),
        "/api/v1/metrics/gpu/summary",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("gpu"));
}

#[tokio::test]
async fn test_token_protects_rest_routes() {
    let hub = hub_with_mailbox(4);
    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let secured = || state(&hub, store.clone(), settings(Some("s3cret"), &[]));

    let (status, _) = get(secured(), "/api/v1/metrics/current", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get(secured(), "/api/v1/metrics/current", Some("wrong")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = get(secured(), "/api/v1/metrics/current", Some("s3cret")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get(secured(), "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_stream_delivers_snapshots() {
    let hub = hub_with_mailbox(16);
    let addr = spawn_api_server(
        "127.0.0.1:0".parse().unwrap(),
        state(&hub, Arc::new(MemoryBackend::new()), settings(Some("s3cret"), &[])),
    )
    .await
    .unwrap();

    let (mut socket, _) = connect_async(format!("ws://{addr}/api/v1/stream?token=s3cret"))
        .await
        .unwrap();
    wait_for_active(&hub, 1).await;

    hub.broadcast(Snapshot::from_measurements(Utc::now(), std::iter::empty()))
        .unwrap();

    let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let Message::Text(text) = message else {
        panic!("expected text message, got {message:?}");
    };
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["type"], "snapshot");

    socket.send(Message::Close(None)).await.unwrap();
    wait_for_active(&hub, 0).await;
}

#[tokio::test]
async fn test_stream_handshake_rejections() {
    let hub = hub_with_mailbox(16);
    let addr = spawn_api_server(
        "127.0.0.1:0".parse().unwrap(),
        state(
            &hub,
            Arc::new(MemoryBackend::new()),
            settings(Some("s3cret"), &["https://dash.local"]),
        ),
    )
    .await
    .unwrap();
    let url = format!("ws://{addr}/api/v1/stream?token=s3cret");

    // no origin header at all
    assert!(connect_async(url.as_str()).await.is_err());

    let mut request = url.as_str().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("https://evil.example"));
    assert!(connect_async(request).await.is_err());

    let mut request = format!("ws://{addr}/api/v1/stream?token=wrong")
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("https://dash.local"));
    assert!(connect_async(request).await.is_err());

    assert_eq!(hub.active_count(), 0, "rejected sockets never reach the hub");

    let mut request = url.as_str().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("https://dash.local"));
    let (_socket, _) = connect_async(request).await.unwrap();
    wait_for_active(&hub, 1).await;
}
