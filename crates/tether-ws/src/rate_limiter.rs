//! Sliding-window admission control for outgoing requests.
//!
//! Keeps the timestamps of recently admitted requests. A request is admitted
//! only while fewer than `max_requests` timestamps fall inside the window.
//! Denial never mutates state; the caller retries later.

use crate::error::{WsError, WsResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Sliding-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum admitted requests per window.
    max_requests: u32,
    /// Window length.
    window: Duration,
    /// Timestamps of admitted requests, oldest first.
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// # Arguments
    /// * `max_requests` - Maximum admitted requests per window
    /// * `window` - Window length
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(max_requests as usize)),
        }
    }

    /// Try to admit a request now.
    pub fn try_admit(&self) -> WsResult<()> {
        self.try_admit_at(Instant::now())
    }

    /// Try to admit a request at `now`.
    ///
    /// Expired timestamps are discarded first; the request is then recorded
    /// only if the window still has room.
    pub fn try_admit_at(&self, now: Instant) -> WsResult<()> {
        let mut timestamps = self.timestamps.lock();
        Self::evict_expired(&mut timestamps, now, self.window);

        if timestamps.len() >= self.max_requests as usize {
            warn!(
                count = timestamps.len(),
                max = self.max_requests,
                "Rate limit reached, request rejected"
            );
            return Err(WsError::RateLimited);
        }

        timestamps.push_back(now);
        Ok(())
    }

    /// Requests admitted within the current window.
    pub fn current_count(&self) -> u32 {
        let mut timestamps = self.timestamps.lock();
        Self::evict_expired(&mut timestamps, Instant::now(), self.window);
        timestamps.len() as u32
    }

    /// Remaining admissions in the current window.
    pub fn remaining_capacity(&self) -> u32 {
        self.max_requests.saturating_sub(self.current_count())
    }

    /// Reset rate limiter state.
    pub fn reset(&self) {
        self.timestamps.lock().clear();
    }

    fn evict_expired(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while timestamps
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= window)
        {
            timestamps.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_ceiling() {
        let limiter = RateLimiter::new(5, Duration::from_secs(1));
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.try_admit_at(now).is_ok());
        }
        assert!(matches!(
            limiter.try_admit_at(now),
            Err(WsError::RateLimited)
        ));
    }

    #[test]
    fn test_rejection_does_not_consume_capacity() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));
        let start = Instant::now();

        limiter.try_admit_at(start).unwrap();
        limiter.try_admit_at(start).unwrap();
        for _ in 0..10 {
            assert!(limiter.try_admit_at(start).is_err());
        }

        // Only the two admitted timestamps exist, so both slots free up together.
        let later = start + Duration::from_secs(1);
        assert!(limiter.try_admit_at(later).is_ok());
        assert!(limiter.try_admit_at(later).is_ok());
        assert!(limiter.try_admit_at(later).is_err());
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_millis(1000));
        let start = Instant::now();

        limiter.try_admit_at(start).unwrap();
        limiter
            .try_admit_at(start + Duration::from_millis(600))
            .unwrap();
        assert!(limiter
            .try_admit_at(start + Duration::from_millis(900))
            .is_err());

        // First timestamp has left the window; the second has not.
        assert!(limiter
            .try_admit_at(start + Duration::from_millis(1000))
            .is_ok());
        assert!(limiter
            .try_admit_at(start + Duration::from_millis(1100))
            .is_err());
    }

    #[test]
    fn test_reset() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.try_admit().unwrap();
        assert_eq!(limiter.remaining_capacity(), 0);

        limiter.reset();
        assert_eq!(limiter.remaining_capacity(), 1);
    }
}
