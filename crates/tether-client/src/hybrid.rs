//! Per-operation transport selection.
//!
//! Operations in the streaming policy set go over the streaming transport
//! when it is connected; if that attempt fails at the transport level the
//! call falls back to the stateless transport. Everything else, and any
//! operation marked force-stateless, goes straight to the stateless
//! transport. There are no retries at this layer.

use crate::config::HybridConfig;
use crate::error::{AppError, AppResult};
use crate::metrics::{TransportMetrics, TransportMetricsSnapshot};
use crate::transport::{Transport, TransportKind};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tether_ws::{RequestOptions, WsError};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Which operations prefer the streaming transport.
#[derive(Debug, Clone, Default)]
pub struct TransportPolicy {
    prefer_streaming: HashSet<String>,
    force_stateless: HashSet<String>,
}

impl TransportPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &HybridConfig) -> Self {
        Self {
            prefer_streaming: config.streaming_operations.iter().cloned().collect(),
            force_stateless: config.force_stateless.iter().cloned().collect(),
        }
    }

    pub fn prefer_streaming(mut self, operation: impl Into<String>) -> Self {
        self.prefer_streaming.insert(operation.into());
        self
    }

    pub fn force_stateless(mut self, operation: impl Into<String>) -> Self {
        self.force_stateless.insert(operation.into());
        self
    }

    /// Whether `operation` should try the streaming transport first.
    pub fn prefers_streaming(&self, operation: &str) -> bool {
        !self.force_stateless.contains(operation) && self.prefer_streaming.contains(operation)
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub request: RequestOptions,
    /// Bypass the policy and use the stateless transport.
    pub force_stateless: bool,
}

impl CallOptions {
    pub fn stateless() -> Self {
        Self {
            force_stateless: true,
            ..Default::default()
        }
    }
}

impl From<RequestOptions> for CallOptions {
    fn from(request: RequestOptions) -> Self {
        Self {
            request,
            force_stateless: false,
        }
    }
}

/// Whether a streaming failure should be retried over the stateless transport.
///
/// A remote error means the server processed the request; sending it again
/// would duplicate the operation. A rate-limit denial is the caller's to
/// handle; replaying it over HTTP would bypass the admission ceiling.
fn falls_back(error: &AppError) -> bool {
    !matches!(
        error,
        AppError::Streaming(WsError::Remote(_) | WsError::RateLimited)
    )
}

/// Hybrid transport client.
pub struct HybridClient {
    streaming: Arc<dyn Transport>,
    stateless: Arc<dyn Transport>,
    policy: RwLock<TransportPolicy>,
    metrics: Arc<TransportMetrics>,
}

impl HybridClient {
    pub fn new(
        streaming: Arc<dyn Transport>,
        stateless: Arc<dyn Transport>,
        policy: TransportPolicy,
    ) -> Self {
        Self {
            streaming,
            stateless,
            policy: RwLock::new(policy),
            metrics: Arc::new(TransportMetrics::new()),
        }
    }

    pub fn set_policy(&self, policy: TransportPolicy) {
        *self.policy.write() = policy;
    }

    pub fn policy(&self) -> TransportPolicy {
        self.policy.read().clone()
    }

    pub fn metrics(&self) -> Arc<TransportMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn metrics_snapshot(&self) -> TransportMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Which transport a call would start on right now.
    pub fn select(&self, operation: &str, options: &CallOptions) -> TransportKind {
        if !options.force_stateless
            && self.policy.read().prefers_streaming(operation)
            && self.streaming.is_available()
        {
            TransportKind::Streaming
        } else {
            TransportKind::Stateless
        }
    }

    pub async fn request(
        &self,
        operation: &str,
        data: Value,
        options: CallOptions,
    ) -> AppResult<Value> {
        if self.select(operation, &options) == TransportKind::Streaming {
            let started = Instant::now();
            let result = self
                .streaming
                .request(operation, data.clone(), &options.request)
                .await;
            self.metrics
                .record(TransportKind::Streaming, started.elapsed(), result.is_ok());

            match result {
                Ok(value) => return Ok(value),
                Err(e) if falls_back(&e) => {
                    warn!(operation, error = %e, "Streaming attempt failed, falling back to stateless");
                }
                Err(e) => return Err(e),
            }
        } else {
            debug!(operation, "Using stateless transport");
        }

        let started = Instant::now();
        let result = self
            .stateless
            .request(operation, data, &options.request)
            .await;
        self.metrics
            .record(TransportKind::Stateless, started.elapsed(), result.is_ok());
        result
    }
}
