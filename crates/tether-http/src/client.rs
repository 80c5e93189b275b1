//! HTTP client for the stateless transport.

use crate::error::{HttpError, HttpResult};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON request/response client.
#[derive(Debug, Clone)]
pub struct StatelessClient {
    client: Client,
    /// Base URL without trailing slash.
    base_url: String,
}

impl StatelessClient {
    /// Create a client with the default timeout.
    pub fn new(base_url: impl Into<String>) -> HttpResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> HttpResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HttpError::Client(format!("Failed to create HTTP client: {e}")))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn operation_url(&self, operation: &str) -> String {
        format!("{}/{}", self.base_url, operation.trim_start_matches('/'))
    }

    /// POST `data` to the operation endpoint and return the JSON body.
    ///
    /// An empty success body yields `Value::Null`.
    pub async fn request(&self, operation: &str, data: &Value) -> HttpResult<Value> {
        let url = self.operation_url(operation);
        debug!(url = %url, operation, "Sending stateless request");

        let response = self.client.post(&url).json(data).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(operation, status = status.as_u16(), "Stateless request failed");
            return Err(HttpError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}
