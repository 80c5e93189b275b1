//! Transport configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the streaming transport.
///
/// Derived thresholds (`health_check_interval_ms`, `pong_stale_after_ms`,
/// `connection_dead_after_ms`) default to fractions/multiples of the
/// heartbeat interval when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Interval between heartbeats.
    pub heartbeat_interval_ms: u64,
    /// Interval between health evaluations (default: heartbeat / 3).
    pub health_check_interval_ms: Option<u64>,
    /// Pong age from which pongs count as missed (default: 1.5 x heartbeat).
    pub pong_stale_after_ms: Option<u64>,
    /// Pong age from which the connection is declared dead (default: 3 x heartbeat).
    pub connection_dead_after_ms: Option<u64>,
    /// Delay after connecting before heartbeats start.
    pub heartbeat_start_delay_ms: u64,
    /// Handshake deadline.
    pub connect_timeout_ms: u64,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
    /// Outbound queue bound.
    pub queue_capacity: usize,
    /// Send attempts before a queued message is dropped.
    pub queue_max_retries: u32,
    /// Items per batch before a size-triggered flush.
    pub batch_max_size: usize,
    /// Delay from the first unflushed item to a timer-triggered flush.
    pub batch_max_delay_ms: u64,
    /// Requests admitted per rate-limit window.
    pub rate_limit_max_requests: u32,
    /// Rate-limit window.
    pub rate_limit_window_ms: u64,
    /// Lifetime of cached responses.
    pub cache_ttl_ms: u64,
    /// Default deadline for correlated requests.
    pub request_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 30_000,
            health_check_interval_ms: None,
            pong_stale_after_ms: None,
            connection_dead_after_ms: None,
            heartbeat_start_delay_ms: 5_000,
            connect_timeout_ms: 10_000,
            max_reconnect_attempts: 10,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            queue_capacity: 100,
            queue_max_retries: 3,
            batch_max_size: 20,
            batch_max_delay_ms: 1_000,
            rate_limit_max_requests: 50,
            rate_limit_window_ms: 1_000,
            cache_ttl_ms: 30_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl TransportConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    pub fn health_check_interval(&self) -> Duration {
        self.health_check_interval_ms
            .map(|ms| Duration::from_millis(ms.max(1)))
            .unwrap_or_else(|| self.heartbeat_interval() / 3)
    }

    pub fn pong_stale_after(&self) -> Duration {
        self.pong_stale_after_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.heartbeat_interval().mul_f64(1.5))
    }

    pub fn connection_dead_after(&self) -> Duration {
        self.connection_dead_after_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.heartbeat_interval() * 3)
    }

    pub fn heartbeat_start_delay(&self) -> Duration {
        Duration::from_millis(self.heartbeat_start_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn batch_max_delay(&self) -> Duration {
        Duration::from_millis(self.batch_max_delay_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Backoff before the next reconnect, given how many attempts were
    /// already made: `min(base * 2^attempts, max)`.
    pub fn backoff_delay(&self, attempts: u32) -> Duration {
        let base = self.reconnect_base_delay_ms;
        let max = self.reconnect_max_delay_ms;

        // 2^31 * base already exceeds any sane cap.
        let exponent = attempts.min(31);
        let delay = base.saturating_mul(1u64 << exponent).min(max);
        Duration::from_millis(delay)
    }

    /// Whether another reconnect attempt is allowed after `attempts`.
    pub fn allows_reconnect(&self, attempts: u32) -> bool {
        self.max_reconnect_attempts == 0 || attempts < self.max_reconnect_attempts
    }
}
