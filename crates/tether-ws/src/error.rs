//! Streaming transport error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    /// Socket-level open or send failure.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A correlated request exceeded its deadline.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    Timeout { request_id: String, timeout_ms: u64 },

    /// Admission denied by the rate limiter; retry later.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Intentional teardown while the operation was outstanding.
    #[error("Connection closed")]
    Closed,

    /// Malformed or unparseable inbound frame.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The remote side answered with an explicit error status.
    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WsError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) | Self::Tungstenite(_) => "connection",
            Self::Timeout { .. } => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Closed => "closed",
            Self::Protocol(_) | Self::Json(_) => "protocol",
            Self::Remote(_) => "remote_error",
        }
    }
}

pub type WsResult<T> = Result<T, WsError>;
