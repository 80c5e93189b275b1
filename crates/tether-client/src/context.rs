//! Process-wide transport context.
//!
//! Built once at startup and handed to everything that needs the transport
//! layer; there is no global client.

use crate::broadcast::{BroadcastChannel, CrossTabBroadcaster};
use crate::config::AppConfig;
use crate::error::AppResult;
use crate::hybrid::{CallOptions, HybridClient, TransportPolicy};
use crate::metrics::{TransportMetrics, TransportMetricsSnapshot};
use crate::transport::{HttpTransport, StreamingTransport};
use serde_json::Value;
use std::sync::Arc;
use tether_http::StatelessClient;
use tether_ws::{Connector, TransportClient, TungsteniteConnector};
use tracing::info;

/// Owns both transports, the selector and the cross-tab history slice.
pub struct TransportContext {
    config: AppConfig,
    streaming: TransportClient,
    hybrid: Arc<HybridClient>,
    history: CrossTabBroadcaster<Value>,
}

impl TransportContext {
    /// Build the context for the configured endpoints with a private
    /// broadcast channel.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let connector = Arc::new(TungsteniteConnector::new(config.ws_url.clone()));
        let channel = BroadcastChannel::new(config.broadcast.capacity);
        Self::with_connector(config, connector, &channel)
    }

    /// Build the context over an explicit connector, joining `channel` as one tab.
    pub fn with_connector(
        config: AppConfig,
        connector: Arc<dyn Connector>,
        channel: &BroadcastChannel<Value>,
    ) -> AppResult<Self> {
        let streaming = TransportClient::new(config.transport.clone(), connector);
        let stateless =
            StatelessClient::with_timeout(config.http_base_url.clone(), config.http_timeout())?;

        let hybrid = Arc::new(HybridClient::new(
            Arc::new(StreamingTransport::new(streaming.clone())),
            Arc::new(HttpTransport::new(stateless)),
            TransportPolicy::from_config(&config.hybrid),
        ));
        let history = CrossTabBroadcaster::join(channel, Value::Array(Vec::new()));

        info!(
            ws_url = %config.ws_url,
            http_base_url = %config.http_base_url,
            "Transport context created"
        );
        Ok(Self {
            config,
            streaming,
            hybrid,
            history,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn connect(&self, session_id: &str) -> AppResult<()> {
        Ok(self.streaming.connect(session_id).await?)
    }

    pub async fn disconnect(&self) -> AppResult<()> {
        Ok(self.streaming.disconnect().await?)
    }

    /// Issue an operation through the hybrid selector.
    pub async fn request(
        &self,
        operation: &str,
        data: Value,
        options: CallOptions,
    ) -> AppResult<Value> {
        self.hybrid.request(operation, data, options).await
    }

    pub fn streaming(&self) -> &TransportClient {
        &self.streaming
    }

    pub fn hybrid(&self) -> &HybridClient {
        &self.hybrid
    }

    pub fn transport_metrics(&self) -> Arc<TransportMetrics> {
        self.hybrid.metrics()
    }

    pub fn metrics_snapshot(&self) -> TransportMetricsSnapshot {
        self.hybrid.metrics_snapshot()
    }

    /// Message history mirrored across tabs.
    pub fn history(&self) -> &CrossTabBroadcaster<Value> {
        &self.history
    }

    /// Stop the connection actor, the batch flusher and cross-tab merging.
    pub fn shutdown(&self) {
        info!("Transport context shutting down");
        self.history.close();
        self.streaming.shutdown();
    }
}
