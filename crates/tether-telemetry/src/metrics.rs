//! Prometheus metrics for the tether transport layer.
//!
//! Covers:
//! - Connection state and reconnects
//! - Outbound queue depth and drops
//! - Correlated request outcomes and latency
//! - Heartbeat latency
//! - Batch flushes
//! - Hybrid transport selection
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means a duplicate metric name, which is a startup configuration bug.
//! These panics only occur during static initialization, never at runtime.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    register_int_counter, register_int_gauge, CounterVec, Encoder, Gauge, GaugeVec, HistogramVec,
    IntCounter, IntGauge, TextEncoder,
};

/// Streaming connection state (1 = connected, 0 = otherwise).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "tether_ws_connected",
        "Streaming connection state (1=connected)"
    )
    .unwrap()
});

/// Connection state machine current state.
/// Labels: state (disconnected/connecting/connected/reconnecting/errored)
pub static WS_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "tether_ws_state",
        "Connection state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Total reconnection attempts scheduled.
/// Labels: reason (closed/error/heartbeat/handshake)
pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tether_ws_reconnect_total",
        "Total reconnection attempts scheduled",
        &["reason"]
    )
    .unwrap()
});

/// Messages currently waiting in the outbound queue.
pub static QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "tether_queue_depth",
        "Messages waiting in the outbound queue"
    )
    .unwrap()
});

/// Messages dropped from the outbound queue.
/// Labels: reason (evicted/retries_exhausted)
pub static QUEUE_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tether_queue_dropped_total",
        "Messages dropped from the outbound queue",
        &["reason"]
    )
    .unwrap()
});

/// Correlated request outcomes.
/// Labels: outcome (ok/remote_error/timeout/rate_limited/closed/cache_hit)
pub static REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tether_requests_total",
        "Correlated request outcomes",
        &["outcome"]
    )
    .unwrap()
});

/// Request latency by transport.
/// Labels: transport (streaming/stateless)
pub static REQUEST_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "tether_request_latency_ms",
        "Request latency in milliseconds",
        &["transport"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Smoothed heartbeat round-trip latency.
pub static HEARTBEAT_LATENCY_MS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "tether_heartbeat_latency_ms",
        "Exponential moving average of heartbeat round-trip latency"
    )
    .unwrap()
});

/// Inbound frames dropped because they could not be parsed.
pub static FRAMES_MALFORMED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tether_frames_malformed_total",
        "Inbound frames dropped as malformed"
    )
    .unwrap()
});

/// Batch flushes by trigger.
/// Labels: trigger (size/timer)
pub static BATCH_FLUSH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tether_batch_flush_total",
        "Batch flushes by trigger",
        &["trigger"]
    )
    .unwrap()
});

/// Hybrid transport attempts.
/// Labels: transport (streaming/stateless), outcome (ok/error)
pub static TRANSPORT_ATTEMPTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tether_transport_attempts_total",
        "Hybrid client attempts per transport",
        &["transport", "outcome"]
    )
    .unwrap()
});

/// Metrics helper for common operations.
pub struct Metrics;

impl Metrics {
    /// Set the connection state machine state.
    /// Only the active state is set to 1, all others to 0.
    pub fn ws_state_set(state: &str) {
        for s in &[
            "disconnected",
            "connecting",
            "connected",
            "reconnecting",
            "errored",
        ] {
            WS_STATE.with_label_values(&[s]).set(0.0);
        }
        WS_STATE.with_label_values(&[state]).set(1.0);
        WS_CONNECTED.set(if state == "connected" { 1.0 } else { 0.0 });
    }

    /// Record a scheduled reconnect.
    pub fn ws_reconnect(reason: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Set the outbound queue depth.
    pub fn queue_depth(depth: usize) {
        QUEUE_DEPTH.set(depth as i64);
    }

    /// Record a queued message being dropped.
    pub fn queue_dropped(reason: &str) {
        QUEUE_DROPPED_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record a correlated request outcome.
    pub fn request_outcome(outcome: &str) {
        REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record request latency for a transport.
    pub fn request_latency(transport: &str, latency_ms: f64) {
        REQUEST_LATENCY_MS
            .with_label_values(&[transport])
            .observe(latency_ms);
    }

    /// Set smoothed heartbeat latency.
    pub fn heartbeat_latency(latency_ms: f64) {
        HEARTBEAT_LATENCY_MS.set(latency_ms);
    }

    /// Record a malformed inbound frame.
    pub fn frame_malformed() {
        FRAMES_MALFORMED_TOTAL.inc();
    }

    /// Record a batch flush.
    pub fn batch_flushed(trigger: &str) {
        BATCH_FLUSH_TOTAL.with_label_values(&[trigger]).inc();
    }

    /// Record a hybrid transport attempt.
    pub fn transport_attempt(transport: &str, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        TRANSPORT_ATTEMPTS_TOTAL
            .with_label_values(&[transport, outcome])
            .inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn encode() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_state_set_is_exclusive() {
        Metrics::ws_state_set("reconnecting");
        assert_eq!(WS_STATE.with_label_values(&["reconnecting"]).get(), 1.0);
        assert_eq!(WS_STATE.with_label_values(&["connected"]).get(), 0.0);
        assert_eq!(WS_CONNECTED.get(), 0.0);

        Metrics::ws_state_set("connected");
        assert_eq!(WS_STATE.with_label_values(&["reconnecting"]).get(), 0.0);
        assert_eq!(WS_CONNECTED.get(), 1.0);
    }

    #[test]
    fn test_encode_contains_registered_metrics() {
        Metrics::queue_dropped("evicted");
        let text = Metrics::encode().unwrap();
        assert!(text.contains("tether_queue_dropped_total"));
    }
}
