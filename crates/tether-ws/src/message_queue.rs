//! Bounded FIFO buffer for messages that cannot be sent immediately.
//!
//! Owned exclusively by the connection manager. When the bound is exceeded
//! the oldest message is evicted. A flush attempts every message in order;
//! failures are re-queued until their retry ceiling, then dropped with an
//! error log. One bad message never stalls the rest.

use crate::socket::{FrameSink, WireMessage};
use std::collections::VecDeque;
use tether_telemetry::Metrics;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// A message waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub payload: String,
    pub queued_at: Instant,
    pub retry_count: u32,
}

/// Outcome of a flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub sent: usize,
    pub requeued: usize,
    pub dropped: usize,
}

/// Outbound message queue.
#[derive(Debug)]
pub struct MessageQueue {
    items: VecDeque<QueuedMessage>,
    capacity: usize,
    max_retries: u32,
}

impl MessageQueue {
    /// Create a queue holding at most `capacity` messages; a message is
    /// dropped once it has failed `max_retries` times.
    pub fn new(capacity: usize, max_retries: u32) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            max_retries,
        }
    }

    /// Append a message. Returns the evicted message if the bound was exceeded.
    pub fn enqueue(&mut self, payload: String) -> Option<QueuedMessage> {
        self.items.push_back(QueuedMessage {
            payload,
            queued_at: Instant::now(),
            retry_count: 0,
        });

        let evicted = if self.items.len() > self.capacity {
            let oldest = self.items.pop_front();
            if let Some(msg) = &oldest {
                warn!(
                    capacity = self.capacity,
                    queued_ms = msg.queued_at.elapsed().as_millis() as u64,
                    "Message queue full, evicted oldest message"
                );
                Metrics::queue_dropped("evicted");
            }
            oldest
        } else {
            None
        };

        Metrics::queue_depth(self.items.len());
        evicted
    }

    /// Attempt every queued message in order through `sink`.
    pub async fn flush(&mut self, sink: &mut dyn FrameSink) -> FlushReport {
        let mut report = FlushReport::default();
        if self.items.is_empty() {
            return report;
        }

        let attempts: Vec<QueuedMessage> = self.items.drain(..).collect();
        let mut retained = VecDeque::new();
        debug!(count = attempts.len(), "Flushing message queue");

        for mut msg in attempts {
            match sink.send(WireMessage::Text(msg.payload.clone())).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    msg.retry_count += 1;
                    if msg.retry_count < self.max_retries {
                        warn!(
                            retry_count = msg.retry_count,
                            error = %e,
                            "Queued message send failed, re-queued"
                        );
                        retained.push_back(msg);
                        report.requeued += 1;
                    } else {
                        error!(
                            retry_count = msg.retry_count,
                            error = %e,
                            "Queued message dropped after retry ceiling"
                        );
                        Metrics::queue_dropped("retries_exhausted");
                        report.dropped += 1;
                    }
                }
            }
        }

        self.items = retained;
        Metrics::queue_depth(self.items.len());
        report
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Queued payloads in order.
    pub fn payloads(&self) -> Vec<String> {
        self.items.iter().map(|m| m.payload.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        Metrics::queue_depth(0);
    }
}
