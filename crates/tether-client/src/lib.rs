//! Hybrid transport client.
//!
//! Wires the streaming connection layer and the stateless HTTP client into
//! one process-wide context:
//! - per-operation transport selection with fallback
//! - comparative transport metrics
//! - cross-tab mirroring of a shared state slice
//! - an optional diagnostics HTTP server

pub mod broadcast;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod hybrid;
pub mod metrics;
pub mod transport;

pub use broadcast::{BroadcastChannel, CrossTabBroadcaster};
pub use config::AppConfig;
pub use context::TransportContext;
pub use diagnostics::DiagnosticsState;
pub use error::{AppError, AppResult};
pub use hybrid::{CallOptions, HybridClient, TransportPolicy};
pub use metrics::{TransportMetrics, TransportMetricsSnapshot, TransportStats};
pub use transport::{HttpTransport, StreamingTransport, Transport, TransportKind};
