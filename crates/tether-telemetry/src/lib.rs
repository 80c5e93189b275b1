//! Prometheus metrics and structured logging for tether.
//!
//! - Prometheus metrics for connection lifecycle, queueing, requests and
//!   transport selection
//! - Structured JSON logging with tracing

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
