//! Comparative per-transport metrics.
//!
//! Purely observational: nothing here influences transport selection.

use crate::transport::TransportKind;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tether_telemetry::Metrics;

/// Counters for one transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TransportStats {
    pub count: u64,
    pub failures: u64,
    /// Mean latency over all completed attempts.
    pub avg_latency_ms: f64,
}

impl TransportStats {
    fn record(&mut self, latency_ms: f64, success: bool) {
        self.count += 1;
        if !success {
            self.failures += 1;
        }
        self.avg_latency_ms += (latency_ms - self.avg_latency_ms) / self.count as f64;
    }

    pub fn success_rate(&self) -> Option<f64> {
        (self.count > 0).then(|| (self.count - self.failures) as f64 / self.count as f64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TransportMetricsSnapshot {
    pub streaming: TransportStats,
    pub stateless: TransportStats,
}

#[derive(Debug, Default)]
pub struct TransportMetrics {
    inner: Mutex<TransportMetricsSnapshot>,
}

impl TransportMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed attempt.
    pub fn record(&self, kind: TransportKind, latency: Duration, success: bool) {
        let latency_ms = latency.as_secs_f64() * 1000.0;
        {
            let mut inner = self.inner.lock();
            let stats = match kind {
                TransportKind::Streaming => &mut inner.streaming,
                TransportKind::Stateless => &mut inner.stateless,
            };
            stats.record(latency_ms, success);
        }

        Metrics::transport_attempt(kind.as_str(), success);
        Metrics::request_latency(kind.as_str(), latency_ms);
    }

    pub fn snapshot(&self) -> TransportMetricsSnapshot {
        *self.inner.lock()
    }

    pub fn get(&self, kind: TransportKind) -> TransportStats {
        let inner = self.inner.lock();
        match kind {
            TransportKind::Streaming => inner.streaming,
            TransportKind::Stateless => inner.stateless,
        }
    }
}
