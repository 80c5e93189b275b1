//! Resilient streaming transport for a single logical session.
//!
//! Provides:
//! - Connection state machine with exponential-backoff reconnection
//! - Heartbeat liveness detection independent of socket close detection
//! - Bounded outbound queue flushed in order on (re)connect
//! - Request/response correlation with per-request timeouts
//! - TTL response cache, sliding-window rate limiting, event batching
//! - Typed event subscriptions

pub mod batch;
pub mod cache;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod message;
pub mod message_queue;
pub mod pending;
pub mod rate_limiter;
pub mod socket;

pub use batch::{BatchAccumulator, FlushTrigger};
pub use cache::{cache_key, canonical_json, ResponseCache};
pub use client::{RequestOptions, TransportClient};
pub use config::TransportConfig;
pub use connection::{ConnectionManager, ConnectionState, ConnectionStatus};
pub use error::{WsError, WsResult};
pub use events::{EventBus, EventKind, Subscription, TransportEvent};
pub use heartbeat::{HealthState, HealthVerdict, HeartbeatMonitor};
pub use message::{Frame, FrameStatus, InboundFrame};
pub use message_queue::{FlushReport, MessageQueue, QueuedMessage};
pub use pending::{PendingRequestTable, PendingResponse};
pub use rate_limiter::RateLimiter;
pub use socket::{
    BoxFuture, Connector, FrameSink, FrameStream, SocketPair, TungsteniteConnector, WireMessage,
};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Install the rustls crypto provider used for `wss://` endpoints.
/// Call once before the first connection.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
