//! Diagnostics HTTP server.
//!
//! - `GET /health`: connection and health snapshots
//! - `GET /metrics/transport`: per-transport comparison
//! - `GET /metrics`: Prometheus text format

use crate::error::AppResult;
use crate::metrics::{TransportMetrics, TransportMetricsSnapshot};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use std::sync::Arc;
use tether_telemetry::Metrics;
use tether_ws::{ConnectionState, HealthState, TransportClient};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct DiagnosticsState {
    streaming: TransportClient,
    metrics: Arc<TransportMetrics>,
}

impl DiagnosticsState {
    pub fn new(streaming: TransportClient, metrics: Arc<TransportMetrics>) -> Self {
        Self { streaming, metrics }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub connection: ConnectionState,
    pub health: HealthState,
    pub pending_requests: usize,
    pub cached_responses: usize,
}

pub fn create_router(state: DiagnosticsState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/metrics/transport", get(get_transport_metrics))
        .route("/metrics", get(get_prometheus))
        .with_state(state)
}

async fn get_health(State(state): State<DiagnosticsState>) -> Json<HealthReport> {
    Json(HealthReport {
        connection: state.streaming.state(),
        health: state.streaming.health(),
        pending_requests: state.streaming.pending_count(),
        cached_responses: state.streaming.cache().len(),
    })
}

async fn get_transport_metrics(
    State(state): State<DiagnosticsState>,
) -> Json<TransportMetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn get_prometheus() -> Response {
    match Metrics::encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Serve diagnostics on `addr` until `shutdown` is cancelled.
pub async fn serve(
    addr: &str,
    state: DiagnosticsState,
    shutdown: CancellationToken,
) -> AppResult<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Diagnostics server listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
