//! Transport seam over the streaming and stateless clients.

use crate::error::AppResult;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use tether_http::StatelessClient;
use tether_ws::{RequestOptions, TransportClient};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Streaming,
    Stateless,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::Stateless => "stateless",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transport that can carry one request/response operation.
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Whether the transport can take a request right now.
    fn is_available(&self) -> bool;

    fn request<'a>(
        &'a self,
        operation: &'a str,
        data: Value,
        options: &'a RequestOptions,
    ) -> BoxFuture<'a, AppResult<Value>>;
}

/// Streaming transport backed by the connection manager.
pub struct StreamingTransport {
    client: TransportClient,
}

impl StreamingTransport {
    pub fn new(client: TransportClient) -> Self {
        Self { client }
    }
}

impl Transport for StreamingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Streaming
    }

    fn is_available(&self) -> bool {
        self.client.is_connected()
    }

    fn request<'a>(
        &'a self,
        operation: &'a str,
        data: Value,
        options: &'a RequestOptions,
    ) -> BoxFuture<'a, AppResult<Value>> {
        Box::pin(async move {
            Ok(self
                .client
                .request(operation, data, options.clone())
                .await?)
        })
    }
}

/// Stateless transport. Always available; request options other than the
/// timeout configured on the client do not apply.
pub struct HttpTransport {
    client: StatelessClient,
}

impl HttpTransport {
    pub fn new(client: StatelessClient) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stateless
    }

    fn is_available(&self) -> bool {
        true
    }

    fn request<'a>(
        &'a self,
        operation: &'a str,
        data: Value,
        _options: &'a RequestOptions,
    ) -> BoxFuture<'a, AppResult<Value>> {
        Box::pin(async move { Ok(self.client.request(operation, &data).await?) })
    }
}
