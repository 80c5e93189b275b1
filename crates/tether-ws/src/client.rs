//! Public handle for the streaming transport.
//!
//! `TransportClient` wires the connection actor together with the request
//! path (cache, rate limiter, correlation table) and the batch flusher.

use crate::batch::{BatchAccumulator, FlushTrigger};
use crate::cache::{cache_key, ResponseCache};
use crate::config::TransportConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::{WsError, WsResult};
use crate::events::{EventBus, EventKind, Subscription, TransportEvent};
use crate::heartbeat::HealthState;
use crate::message::Frame;
use crate::pending::{CacheSlot, PendingRequestTable};
use crate::rate_limiter::RateLimiter;
use crate::socket::{Connector, TungsteniteConnector};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tether_telemetry::Metrics;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Overrides the configured request timeout.
    pub timeout: Option<Duration>,
    /// Serve from / store into the response cache.
    pub cacheable: bool,
    /// Resource family the cached response belongs to.
    pub cache_family: Option<String>,
    /// Families whose cached reads this request invalidates.
    pub invalidates: Vec<String>,
}

impl RequestOptions {
    pub fn cached() -> Self {
        Self {
            cacheable: true,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn in_family(mut self, family: impl Into<String>) -> Self {
        self.cache_family = Some(family.into());
        self
    }

    pub fn invalidating(mut self, family: impl Into<String>) -> Self {
        self.invalidates.push(family.into());
        self
    }
}

struct BatchState {
    accumulator: Mutex<BatchAccumulator>,
    /// Wakes the flusher when the first item of a new batch arrives.
    wake: Notify,
}

struct Inner {
    config: TransportConfig,
    manager: ConnectionManager,
    pending: Arc<PendingRequestTable>,
    cache: Arc<ResponseCache>,
    limiter: RateLimiter,
    events: Arc<EventBus>,
    batch: Arc<BatchState>,
    shutdown: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Streaming transport client. Cheap to clone.
#[derive(Clone)]
pub struct TransportClient {
    inner: Arc<Inner>,
}

impl TransportClient {
    /// Build a client over `connector`. Must be called within a tokio runtime.
    pub fn new(config: TransportConfig, connector: Arc<dyn Connector>) -> Self {
        let cache = Arc::new(ResponseCache::new(config.cache_ttl()));
        let pending = Arc::new(PendingRequestTable::new(Arc::clone(&cache)));
        let events = EventBus::new();
        let manager = ConnectionManager::spawn(
            config.clone(),
            connector,
            Arc::clone(&pending),
            Arc::clone(&events),
        );
        let batch = Arc::new(BatchState {
            accumulator: Mutex::new(BatchAccumulator::new(
                config.batch_max_size,
                config.batch_max_delay(),
            )),
            wake: Notify::new(),
        });

        let inner = Arc::new(Inner {
            limiter: RateLimiter::new(config.rate_limit_max_requests, config.rate_limit_window()),
            config,
            manager,
            pending,
            cache,
            events,
            batch,
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(run_batch_flusher(Arc::downgrade(&inner)));

        Self { inner }
    }

    /// Build a client for a WebSocket endpoint.
    pub fn with_url(config: TransportConfig, url: impl Into<String>) -> Self {
        Self::new(config, Arc::new(TungsteniteConnector::new(url)))
    }

    pub async fn connect(&self, session_id: impl Into<String>) -> WsResult<()> {
        self.inner.manager.connect(session_id).await
    }

    /// Intentional teardown. Unsent batch items are discarded.
    pub async fn disconnect(&self) -> WsResult<()> {
        let discarded = self.inner.batch.accumulator.lock().clear();
        if discarded > 0 {
            warn!(discarded, "Discarded unsent batch items on disconnect");
        }
        // Let the flusher drop its deadline.
        self.inner.batch.wake.notify_one();
        self.inner.manager.disconnect().await
    }

    /// Fire-and-forget send. Queued while not connected.
    pub fn send(&self, frame: &Frame) -> WsResult<()> {
        self.inner.manager.send_raw(frame.to_text()?)
    }

    /// Issue a correlated request and wait for its response.
    ///
    /// A fresh cached response short-circuits the round trip and does not
    /// count against the rate limit.
    pub async fn request(
        &self,
        operation: &str,
        data: Value,
        options: RequestOptions,
    ) -> WsResult<Value> {
        let inner = &self.inner;

        let slot = options.cacheable.then(|| CacheSlot {
            key: cache_key(operation, &data),
            family: options.cache_family.clone(),
        });
        if let Some(slot) = &slot {
            if let Some(value) = inner.cache.get(&slot.key) {
                debug!(operation, key = %slot.key, "Cache hit");
                Metrics::request_outcome("cache_hit");
                return Ok(value);
            }
        }

        if let Err(e) = inner.limiter.try_admit() {
            Metrics::request_outcome("rate_limited");
            return Err(e);
        }

        for family in &options.invalidates {
            let removed = inner.cache.invalidate_family(family);
            if removed > 0 {
                debug!(family = %family, removed, "Invalidated cached reads");
            }
        }

        let request_id = inner.pending.next_request_id();
        let timeout = options.timeout.unwrap_or_else(|| inner.config.request_timeout());
        let frame = Frame::request(operation, request_id.clone(), data);
        let payload = frame.to_text()?;

        let response = inner.pending.register(request_id.clone(), timeout, slot);
        debug!(operation, request_id = %request_id, "Sending request");
        inner.manager.send_raw(payload)?;
        response.recv().await
    }

    /// Send `items` as one batch frame and wait for the per-item results.
    pub async fn request_batch(&self, items: Vec<Value>) -> WsResult<Vec<Value>> {
        let response = dispatch_batch(&self.inner, items, FlushTrigger::Explicit)?;
        match response.await? {
            Value::Array(results) => Ok(results),
            other => Err(WsError::Protocol(format!(
                "batch result is not an array: {other}"
            ))),
        }
    }

    /// Queue a low-priority event for batched delivery.
    pub fn track(&self, item: Value) {
        let (full, first) = {
            let mut acc = self.inner.batch.accumulator.lock();
            let first = acc.is_empty();
            (acc.push(item), first)
        };

        match full {
            Some(items) => {
                if let Err(e) = dispatch_logged(&self.inner, items, FlushTrigger::Size) {
                    warn!(error = %e, "Batch flush failed");
                }
                // Deadline belongs to the batch just sent.
                self.inner.batch.wake.notify_one();
            }
            None if first => self.inner.batch.wake.notify_one(),
            None => {}
        }
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    /// Subscribe to push frames of one type.
    pub fn on_push<F>(&self, frame_type: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.inner.events.on_push(frame_type, handler)
    }

    pub fn off(&self, subscription: &Subscription) -> bool {
        self.inner.events.off(subscription)
    }

    pub fn set_visibility(&self, visible: bool) -> WsResult<()> {
        self.inner.manager.set_visibility(visible)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.manager.state()
    }

    pub fn health(&self) -> HealthState {
        self.inner.manager.health()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.manager.watch_state()
    }

    pub fn watch_health(&self) -> watch::Receiver<HealthState> {
        self.inner.manager.watch_health()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.manager.state().is_connected()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.pending_count()
    }

    pub fn batch_len(&self) -> usize {
        self.inner.batch.accumulator.lock().len()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    /// Stop the connection actor and the batch flusher.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.manager.shutdown();
    }
}

/// Register and send one batch frame. The returned future resolves with the
/// batch result.
fn dispatch_batch(
    inner: &Inner,
    items: Vec<Value>,
    trigger: FlushTrigger,
) -> WsResult<impl std::future::Future<Output = WsResult<Value>>> {
    let batch_id = inner.pending.next_batch_id();
    let count = items.len();
    let payload = Frame::batch(batch_id.clone(), items).to_text()?;

    let response = inner
        .pending
        .register(batch_id.clone(), inner.config.request_timeout(), None);
    inner.manager.send_raw(payload)?;
    Metrics::batch_flushed(trigger.as_str());
    debug!(batch_id = %batch_id, count, trigger = trigger.as_str(), "Batch flushed");

    Ok(response.recv())
}

/// Send a tracked batch and log its outcome in the background.
fn dispatch_logged(inner: &Inner, items: Vec<Value>, trigger: FlushTrigger) -> WsResult<()> {
    let count = items.len();
    let response = dispatch_batch(inner, items, trigger)?;
    tokio::spawn(async move {
        match response.await {
            Ok(_) => debug!(count, "Batch acknowledged"),
            Err(e) => warn!(count, error = %e, "Batch not acknowledged"),
        }
    });
    Ok(())
}

/// Timer-triggered batch flushing. Exits when the client is dropped or shut down.
async fn run_batch_flusher(inner: std::sync::Weak<Inner>) {
    loop {
        let (batch, shutdown, deadline) = {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let deadline = inner.batch.accumulator.lock().deadline();
            (Arc::clone(&inner.batch), inner.shutdown.clone(), deadline)
        };

        tokio::select! {
            () = shutdown.cancelled() => {
                let discarded = batch.accumulator.lock().clear();
                if discarded > 0 {
                    warn!(discarded, "Discarded unsent batch items on shutdown");
                }
                break;
            }
            () = batch.wake.notified() => continue,
            () = sleep_until_opt(deadline) => {}
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        let due = inner.batch.accumulator.lock().take_if_due(Instant::now());
        if let Some(items) = due {
            if let Err(e) = dispatch_logged(&inner, items, FlushTrigger::Timer) {
                warn!(error = %e, "Batch flush failed");
            }
        }
    }
    info!("Batch flusher stopped");
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_options_builders() {
        let options = RequestOptions::cached()
            .in_family("history:s1")
            .with_timeout(Duration::from_secs(2));
        assert!(options.cacheable);
        assert_eq!(options.cache_family.as_deref(), Some("history:s1"));
        assert_eq!(options.timeout, Some(Duration::from_secs(2)));

        let options = RequestOptions::default().invalidating("history:s1");
        assert!(!options.cacheable);
        assert_eq!(options.invalidates, vec!["history:s1".to_string()]);
    }
}
