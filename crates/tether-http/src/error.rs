//! Stateless transport error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HttpError {
    /// Whether the server was reached and answered with a failure status.
    pub fn is_status(&self) -> bool {
        matches!(self, Self::Status { .. })
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

pub type HttpResult<T> = Result<T, HttpError>;
