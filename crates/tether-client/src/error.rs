//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Streaming transport error: {0}")]
    Streaming(#[from] tether_ws::WsError),

    #[error("Stateless transport error: {0}")]
    Stateless(#[from] tether_http::HttpError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tether_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
