//! Heartbeat monitoring for the streaming connection.
//!
//! Two independent timers drive this monitor while connected: a sender that
//! records each heartbeat, and a shorter-period evaluator that judges the age of
//! the last pong. Liveness is decided here rather than by the socket's own
//! close detection, which can take minutes on a silently dead link.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Weight of a new latency sample in the moving average.
const LATENCY_EMA_WEIGHT: f64 = 0.1;

/// Health snapshot published to observers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthState {
    pub last_heartbeat_sent_at: Option<DateTime<Utc>>,
    pub last_pong_received_at: Option<DateTime<Utc>>,
    /// Exponential moving average of round-trip latency.
    pub latency_ms: Option<f64>,
    pub consecutive_failures: u32,
    pub missed_pongs: u32,
    pub is_healthy: bool,
}

/// Result of one health evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    /// No pong received yet; no judgement.
    Grace,
    /// Last pong is fresh.
    Healthy,
    /// Last pong is stale but not yet fatal.
    Degraded { missed_pongs: u32 },
    /// Last pong is too old; the connection must be considered dead.
    Dead,
}

/// Heartbeat monitor.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    /// Heartbeat interval.
    interval: Duration,
    /// Pong age from which pongs count as missed.
    stale_after: Duration,
    /// Pong age from which the connection is declared dead.
    dead_after: Duration,
    last_sent: Option<Instant>,
    last_pong: Option<Instant>,
    state: HealthState,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration, stale_after: Duration, dead_after: Duration) -> Self {
        Self {
            interval,
            stale_after,
            dead_after,
            last_sent: None,
            last_pong: None,
            state: HealthState::default(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Forget everything, including the failure count (intentional teardown).
    pub fn reset(&mut self) {
        self.last_sent = None;
        self.last_pong = None;
        self.state = HealthState::default();
    }

    /// Start a new grace period (new socket or return to visibility).
    ///
    /// `consecutive_failures` survives until the next pong, so a heartbeat
    /// death stays visible on the replacement socket until it answers.
    pub fn restart(&mut self) {
        self.last_sent = None;
        self.last_pong = None;
        self.state = HealthState {
            consecutive_failures: self.state.consecutive_failures,
            ..HealthState::default()
        };
    }

    /// Record that a heartbeat was sent.
    pub fn record_heartbeat_sent(&mut self, now: Instant) {
        self.last_sent = Some(now);
        self.state.last_heartbeat_sent_at = Some(Utc::now());
        debug!("Heartbeat sent");
    }

    /// Record a pong. Returns the round-trip sample if a heartbeat was outstanding.
    pub fn record_pong(&mut self, now: Instant) -> Option<f64> {
        self.last_pong = Some(now);
        self.state.last_pong_received_at = Some(Utc::now());
        self.state.consecutive_failures = 0;

        let sample = self
            .last_sent
            .map(|sent| now.saturating_duration_since(sent).as_secs_f64() * 1000.0)?;
        let smoothed = match self.state.latency_ms {
            Some(prev) => prev * (1.0 - LATENCY_EMA_WEIGHT) + sample * LATENCY_EMA_WEIGHT,
            None => sample,
        };
        self.state.latency_ms = Some(smoothed);
        debug!(rtt_ms = sample, latency_ms = smoothed, "Received pong");
        Some(sample)
    }

    /// Judge liveness from the age of the last pong.
    pub fn evaluate(&mut self, now: Instant) -> HealthVerdict {
        let Some(last_pong) = self.last_pong else {
            return HealthVerdict::Grace;
        };

        let age = now.saturating_duration_since(last_pong);
        if age < self.stale_after {
            self.state.is_healthy = true;
            self.state.consecutive_failures = 0;
            self.state.missed_pongs = 0;
            HealthVerdict::Healthy
        } else if age < self.dead_after {
            self.state.missed_pongs += 1;
            warn!(
                age_ms = age.as_millis() as u64,
                missed_pongs = self.state.missed_pongs,
                "Pong overdue"
            );
            HealthVerdict::Degraded {
                missed_pongs: self.state.missed_pongs,
            }
        } else {
            self.state.is_healthy = false;
            self.state.consecutive_failures += 1;
            warn!(
                age_ms = age.as_millis() as u64,
                consecutive_failures = self.state.consecutive_failures,
                "Connection declared dead"
            );
            HealthVerdict::Dead
        }
    }

    /// Current health snapshot.
    pub fn snapshot(&self) -> HealthState {
        self.state.clone()
    }
}
