//! Request/response correlation.
//!
//! Each outgoing request (or batch) is registered under a unique id before it
//! is sent. The matching inbound frame completes the entry; if the deadline
//! passes first the entry is removed and the caller sees a timeout. Exactly
//! one of the two reaches the caller.

use crate::cache::ResponseCache;
use crate::error::{WsError, WsResult};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether_telemetry::Metrics;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Where a successful response should be cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSlot {
    pub key: String,
    pub family: Option<String>,
}

/// A request awaiting its response.
pub struct PendingRequest {
    /// Correlation id (request id or batch id).
    pub request_id: String,
    /// When the request was registered.
    pub created_at: Instant,
    /// Deadline measured from `created_at`.
    pub timeout: Duration,
    /// Cache destination for cacheable reads.
    pub cache: Option<CacheSlot>,
    /// Channel to notify completion (consumed on first use).
    tx: Option<oneshot::Sender<WsResult<Value>>>,
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("request_id", &self.request_id)
            .field("created_at", &self.created_at)
            .field("timeout", &self.timeout)
            .field("cache", &self.cache)
            .field("has_tx", &self.tx.is_some())
            .finish()
    }
}

/// Table of outstanding correlated requests.
#[derive(Debug)]
pub struct PendingRequestTable {
    /// Pending requests by correlation id.
    pending: DashMap<String, PendingRequest>,
    /// Sequence shared by request and batch ids.
    next_seq: AtomicU64,
    /// Cache written on successful cacheable responses.
    cache: Arc<ResponseCache>,
}

impl PendingRequestTable {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self {
            pending: DashMap::new(),
            next_seq: AtomicU64::new(1),
            cache,
        }
    }

    /// Allocate a new request id.
    pub fn next_request_id(&self) -> String {
        format!("req-{}", self.next_seq.fetch_add(1, Ordering::SeqCst))
    }

    /// Allocate a new batch id.
    pub fn next_batch_id(&self) -> String {
        format!("batch-{}", self.next_seq.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a pending entry and return the handle the caller awaits.
    pub fn register(
        self: &Arc<Self>,
        request_id: String,
        timeout: Duration,
        cache: Option<CacheSlot>,
    ) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        let request = PendingRequest {
            request_id: request_id.clone(),
            created_at: Instant::now(),
            timeout,
            cache,
            tx: Some(tx),
        };
        self.pending.insert(request_id.clone(), request);

        PendingResponse {
            request_id,
            timeout,
            rx,
            table: Arc::clone(self),
        }
    }

    /// Complete a request from its response frame.
    ///
    /// Returns `false` when no entry matches (late response after timeout,
    /// or an id this table never issued).
    pub fn complete(&self, request_id: &str, outcome: Result<Value, String>) -> bool {
        let Some((_, mut request)) = self.pending.remove(request_id) else {
            debug!(request_id, "Response for unknown or expired request");
            return false;
        };

        let result = match outcome {
            Ok(value) => {
                if let Some(slot) = &request.cache {
                    self.cache
                        .put(slot.key.clone(), value.clone(), slot.family.clone());
                }
                Metrics::request_outcome("ok");
                Ok(value)
            }
            Err(message) => {
                Metrics::request_outcome("remote_error");
                Err(WsError::Remote(message))
            }
        };

        let latency_ms = request.created_at.elapsed().as_secs_f64() * 1000.0;
        Metrics::request_latency("streaming", latency_ms);
        debug!(request_id, latency_ms, "Request completed");

        if let Some(tx) = request.tx.take() {
            let _ = tx.send(result);
        }
        true
    }

    /// Complete a batch; the caller receives the per-item results as an array.
    pub fn complete_batch(&self, batch_id: &str, outcome: Result<Vec<Value>, String>) -> bool {
        self.complete(batch_id, outcome.map(Value::Array))
    }

    /// Reject every pending entry and clear the table.
    ///
    /// Returns how many entries were rejected.
    pub fn reject_all(&self, make_error: impl Fn() -> WsError) -> usize {
        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        let mut rejected = 0;

        for id in ids {
            if let Some((_, mut request)) = self.pending.remove(&id) {
                if let Some(tx) = request.tx.take() {
                    let _ = tx.send(Err(make_error()));
                }
                rejected += 1;
            }
        }

        if rejected > 0 {
            warn!(rejected, "Rejected all pending requests");
        }
        rejected
    }

    /// Number of outstanding entries.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether `request_id` is still outstanding.
    pub fn contains(&self, request_id: &str) -> bool {
        self.pending.contains_key(request_id)
    }

    /// Remove an entry without notifying anyone.
    pub fn remove(&self, request_id: &str) -> bool {
        self.pending.remove(request_id).is_some()
    }
}

/// Handle for one outstanding request.
///
/// Dropping the handle before completion removes the entry from the table.
pub struct PendingResponse {
    request_id: String,
    timeout: Duration,
    rx: oneshot::Receiver<WsResult<Value>>,
    table: Arc<PendingRequestTable>,
}

impl PendingResponse {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Wait for the response or the deadline, whichever comes first.
    pub async fn recv(mut self) -> WsResult<Value> {
        match tokio::time::timeout(self.timeout, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(WsError::Closed),
            Err(_) => {
                if self.table.remove(&self.request_id) {
                    warn!(
                        request_id = %self.request_id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Request timed out"
                    );
                    Metrics::request_outcome("timeout");
                    return Err(WsError::Timeout {
                        request_id: self.request_id.clone(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    });
                }
                // Completion won the race after the timer fired.
                match self.rx.try_recv() {
                    Ok(result) => result,
                    Err(_) => Err(WsError::Closed),
                }
            }
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.table.pending.remove(&self.request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> Arc<PendingRequestTable> {
        Arc::new(PendingRequestTable::new(Arc::new(ResponseCache::new(
            Duration::from_secs(30),
        ))))
    }

    #[test]
    fn test_ids_are_unique_and_monotonic() {
        let table = table();
        assert_eq!(table.next_request_id(), "req-1");
        assert_eq!(table.next_batch_id(), "batch-2");
        assert_eq!(table.next_request_id(), "req-3");
    }

    #[tokio::test]
    async fn test_complete_resolves_and_writes_cache() {
        let table = table();
        let slot = CacheSlot {
            key: "get_history:{}".to_string(),
            family: Some("conversation:s1".to_string()),
        };
        let handle = table.register("req-1".to_string(), Duration::from_secs(10), Some(slot));
        assert_eq!(table.pending_count(), 1);

        assert!(table.complete("req-1", Ok(json!({"messages": []}))));
        assert_eq!(handle.recv().await.unwrap(), json!({"messages": []}));
        assert_eq!(table.pending_count(), 0);
        assert_eq!(
            table.cache.get("get_history:{}"),
            Some(json!({"messages": []}))
        );
    }

    #[tokio::test]
    async fn test_error_status_rejects() {
        let table = table();
        let handle = table.register("req-1".to_string(), Duration::from_secs(10), None);

        table.complete("req-1", Err("denied".to_string()));
        match handle.recv().await {
            Err(WsError::Remote(msg)) => assert_eq!(msg, "denied"),
            other => panic!("expected Remote error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_entry_and_late_response_is_ignored() {
        let table = table();
        let handle = table.register("req-1".to_string(), Duration::from_secs(10), None);

        match handle.recv().await {
            Err(WsError::Timeout {
                request_id,
                timeout_ms,
            }) => {
                assert_eq!(request_id, "req-1");
                assert_eq!(timeout_ms, 10_000);
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
        assert_eq!(table.pending_count(), 0);
        assert!(!table.complete("req-1", Ok(json!(1))));
    }

    #[tokio::test]
    async fn test_reject_all_on_teardown() {
        let table = table();
        let a = table.register("req-1".to_string(), Duration::from_secs(10), None);
        let b = table.register("batch-2".to_string(), Duration::from_secs(10), None);

        assert_eq!(table.reject_all(|| WsError::Closed), 2);
        assert!(matches!(a.recv().await, Err(WsError::Closed)));
        assert!(matches!(b.recv().await, Err(WsError::Closed)));
        assert_eq!(table.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_resolves_with_array() {
        let table = table();
        let handle = table.register("batch-1".to_string(), Duration::from_secs(10), None);

        table.complete_batch("batch-1", Ok(vec![json!("a"), json!("b")]));
        assert_eq!(handle.recv().await.unwrap(), json!(["a", "b"]));
    }

    #[test]
    fn test_dropped_handle_removes_entry() {
        let table = table();
        let handle = table.register("req-1".to_string(), Duration::from_secs(10), None);
        assert!(table.contains("req-1"));

        drop(handle);
        assert!(!table.contains("req-1"));
    }
}
