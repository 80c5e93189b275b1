//! End-to-end hybrid transport tests.
//!
//! Real tungstenite and HTTP round trips against in-process servers:
//! - streaming preference and stateless routing
//! - fallback when the streaming path is down or unresponsive
//! - rate-limit denials surfaced rather than replayed
//! - reconnection, shutdown and cross-tab history sync
//! - diagnostics endpoints

mod integration;
use integration::common::mock_http::MockHttpServer;
use integration::common::mock_ws::MockWsServer;
use integration::common::{eventually, test_config};

use futures_util::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tether_client::diagnostics::{create_router, DiagnosticsState};
use tether_client::{AppError, BroadcastChannel, CallOptions, TransportContext};
use tether_ws::{ConnectionStatus, TungsteniteConnector, WsError};
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};

async fn connected_context(ws: &MockWsServer, http: &MockHttpServer) -> TransportContext {
    let context = TransportContext::new(test_config(ws.url(), http.base_url())).unwrap();
    assert_ok!(context.connect("s1").await);
    context
}

#[tokio::test]
async fn test_streaming_preferred_when_connected() {
    let ws = MockWsServer::start().await;
    let http = MockHttpServer::start().await;
    let context = connected_context(&ws, &http).await;

    let value = assert_ok!(
        context
            .request("chat", json!({"text": "hi"}), CallOptions::default())
            .await
    );
    assert_eq!(value["via"], "ws");
    assert_eq!(value["op"], "chat");
    assert_eq!(http.calls(), 0);
    assert_eq!(ws.sessions().await, vec!["s1".to_string()]);

    let sent = ws.received_frames().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["data"]["text"], "hi");
    assert_eq!(context.metrics_snapshot().streaming.count, 1);

    context.shutdown();
    ws.shutdown().await;
}

#[tokio::test]
async fn test_unlisted_and_forced_operations_use_http() {
    let ws = MockWsServer::start().await;
    let http = MockHttpServer::start().await;
    let context = connected_context(&ws, &http).await;

    let upload = assert_ok!(context.request("upload", json!({}), CallOptions::default()).await);
    assert_eq!(upload["via"], "http");

    // Configured as force-stateless even though the socket is up.
    let created = assert_ok!(
        context
            .request("create_session", json!({"name": "n"}), CallOptions::default())
            .await
    );
    assert_eq!(created["via"], "http");
    assert_eq!(created["body"]["name"], "n");

    let chat = assert_ok!(context.request("chat", json!({}), CallOptions::stateless()).await);
    assert_eq!(chat["via"], "http");

    assert_eq!(http.calls(), 3);
    assert!(ws.received_frames().await.is_empty());
    assert_eq!(context.metrics_snapshot().streaming.count, 0);

    context.shutdown();
    ws.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_streaming_goes_stateless() {
    let ws = MockWsServer::start().await;
    let http = MockHttpServer::start().await;
    let ws_url = ws.url();
    ws.shutdown().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let context = TransportContext::new(test_config(ws_url, http.base_url())).unwrap();
    assert_err!(context.connect("s1").await);
    assert!(!context.streaming().is_connected());

    let value = assert_ok!(context.request("chat", json!({}), CallOptions::default()).await);
    assert_eq!(value["via"], "http");
    assert_eq!(context.metrics_snapshot().streaming.count, 0);

    context.shutdown();
}

#[tokio::test]
async fn test_unresponsive_streaming_falls_back() {
    let ws = MockWsServer::start().await;
    let http = MockHttpServer::start().await;
    let context = connected_context(&ws, &http).await;
    ws.set_silent(true);

    let value = assert_ok!(context.request("chat", json!({}), CallOptions::default()).await);
    assert_eq!(value["via"], "http");
    assert_eq!(http.calls(), 1);

    let snapshot = context.metrics_snapshot();
    assert_eq!(snapshot.streaming.count, 1);
    assert_eq!(snapshot.streaming.failures, 1);
    assert_eq!(snapshot.stateless.count, 1);
    assert_eq!(snapshot.stateless.failures, 0);

    context.shutdown();
    ws.shutdown().await;
}

#[tokio::test]
async fn test_rate_limit_denials_reach_the_caller() {
    let ws = MockWsServer::start().await;
    let http = MockHttpServer::start().await;
    let mut config = test_config(ws.url(), http.base_url());
    config.transport.rate_limit_max_requests = 20;
    config.transport.rate_limit_window_ms = 60_000;
    let context = TransportContext::new(config).unwrap();
    assert_ok!(context.connect("s1").await);

    let results = join_all(
        (0..25).map(|i| context.request("chat", json!({"seq": i}), CallOptions::default())),
    )
    .await;

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let denied = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::Streaming(WsError::RateLimited))))
        .count();
    assert_eq!(admitted, 20);
    assert_eq!(denied, 5);
    assert_eq!(http.calls(), 0);

    context.shutdown();
    ws.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_after_connection_drop() {
    let ws = MockWsServer::start().await;
    let http = MockHttpServer::start().await;
    let context = connected_context(&ws, &http).await;
    assert_eq!(ws.connection_count(), 1);

    ws.drop_connections();

    let streaming = context.streaming().clone();
    assert!(eventually(|| ws.connection_count() == 2 && streaming.is_connected()).await);
    assert_eq!(streaming.state().reconnect_attempts, 0);

    let value = assert_ok!(context.request("chat", json!({}), CallOptions::default()).await);
    assert_eq!(value["via"], "ws");

    context.shutdown();
    ws.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_disconnects() {
    let ws = MockWsServer::start().await;
    let http = MockHttpServer::start().await;
    let context = connected_context(&ws, &http).await;

    context.shutdown();

    let streaming = context.streaming().clone();
    assert!(eventually(|| streaming.state().status == ConnectionStatus::Disconnected).await);

    // Streaming is gone; preferred operations still succeed over HTTP.
    let value = assert_ok!(context.request("chat", json!({}), CallOptions::default()).await);
    assert_eq!(value["via"], "http");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(ws.connection_count(), 1);
    ws.shutdown().await;
}

#[tokio::test]
async fn test_history_syncs_between_contexts() {
    let ws = MockWsServer::start().await;
    let http = MockHttpServer::start().await;
    let channel = BroadcastChannel::new(16);

    let tab = |channel: &BroadcastChannel<Value>| {
        TransportContext::with_connector(
            test_config(ws.url(), http.base_url()),
            Arc::new(TungsteniteConnector::new(ws.url())),
            channel,
        )
        .unwrap()
    };
    let tab_a = tab(&channel);
    let tab_b = tab(&channel);

    tab_a.history().publish(json!([{"role": "user", "text": "hello"}]));

    assert!(eventually(|| tab_b.history().current()[0]["text"] == "hello").await);
    assert_eq!(tab_a.history().current(), tab_b.history().current());

    tab_a.shutdown();
    tab_b.shutdown();
    ws.shutdown().await;
}

#[tokio::test]
async fn test_diagnostics_endpoints() {
    let ws = MockWsServer::start().await;
    let http = MockHttpServer::start().await;
    let context = connected_context(&ws, &http).await;
    assert_ok!(context.request("chat", json!({}), CallOptions::default()).await);

    let state = DiagnosticsState::new(context.streaming().clone(), context.transport_metrics());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });

    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["connection"]["status"], "connected");
    assert_eq!(health["connection"]["session_id"], "s1");
    assert_eq!(health["pending_requests"], 0);

    let transport: Value = client
        .get(format!("http://{addr}/metrics/transport"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(transport["streaming"]["count"], 1);
    assert_eq!(transport["stateless"]["count"], 0);

    let metrics = client
        .get(format!("http://{addr}/metrics"))
        .send()
        .await
        .unwrap();
    assert!(metrics.status().is_success());
    let body = metrics.text().await.unwrap();
    assert!(body.contains("tether_transport"));

    context.shutdown();
    ws.shutdown().await;
}
