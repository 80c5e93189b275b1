//! Accumulator for low-priority, high-frequency events.
//!
//! Items are flushed as one batch when either `max_size` items have
//! accumulated or `max_delay` has elapsed since the first unflushed item.
//! Insertion order is preserved within a batch. Never use this for traffic
//! that must go out immediately.

use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// What caused a batch to be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Size,
    Timer,
    /// Caller-issued batch request.
    Explicit,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Timer => "timer",
            Self::Explicit => "explicit",
        }
    }
}

/// Batch accumulator.
#[derive(Debug)]
pub struct BatchAccumulator {
    items: Vec<Value>,
    max_size: usize,
    max_delay: Duration,
    /// Arrival time of the first unflushed item; the flush deadline runs from here.
    first_item_at: Option<Instant>,
}

impl BatchAccumulator {
    pub fn new(max_size: usize, max_delay: Duration) -> Self {
        let max_size = max_size.max(1);
        Self {
            items: Vec::with_capacity(max_size),
            max_size,
            max_delay,
            first_item_at: None,
        }
    }

    /// Append an item. Returns the full batch when `max_size` is reached.
    pub fn push(&mut self, item: Value) -> Option<Vec<Value>> {
        self.push_at(item, Instant::now())
    }

    pub fn push_at(&mut self, item: Value, now: Instant) -> Option<Vec<Value>> {
        if self.items.is_empty() {
            self.first_item_at = Some(now);
        }
        self.items.push(item);

        if self.items.len() >= self.max_size {
            Some(self.take())
        } else {
            None
        }
    }

    /// When the pending items must be flushed, if any are pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.first_item_at.map(|t| t + self.max_delay)
    }

    /// Release the batch if its deadline has passed.
    pub fn take_if_due(&mut self, now: Instant) -> Option<Vec<Value>> {
        match self.deadline() {
            Some(deadline) if now >= deadline => Some(self.take()),
            _ => None,
        }
    }

    /// Release everything accumulated so far and clear the deadline.
    pub fn take(&mut self) -> Vec<Value> {
        self.first_item_at = None;
        std::mem::replace(&mut self.items, Vec::with_capacity(self.max_size))
    }

    /// Discard pending items. Returns how many were discarded.
    pub fn clear(&mut self) -> usize {
        self.first_item_at = None;
        let n = self.items.len();
        self.items.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
