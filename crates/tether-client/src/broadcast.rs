//! Cross-tab state mirroring.
//!
//! A [`BroadcastChannel`] is the same-origin medium shared by every tab of
//! one host; each [`CrossTabBroadcaster`] joined to it owns a local copy of
//! one state slice. Local changes are republished to the other tabs and
//! incoming changes replace the local copy outright (last write wins).
//! Concurrent edits from two tabs are not reconciled.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// One published change.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub origin: String,
    pub payload: T,
}

/// Shared medium for all tabs of one origin.
#[derive(Debug)]
pub struct BroadcastChannel<T> {
    tx: broadcast::Sender<Envelope<T>>,
}

impl<T> Clone for BroadcastChannel<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> BroadcastChannel<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Number of tabs currently listening.
    pub fn listeners(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Mirrors one state slice between tabs.
pub struct CrossTabBroadcaster<T> {
    origin: String,
    channel: BroadcastChannel<T>,
    slice: Arc<watch::Sender<T>>,
    shutdown: CancellationToken,
}

impl<T> CrossTabBroadcaster<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Join `channel` with an initial local value. Must be called within a
    /// tokio runtime.
    pub fn join(channel: &BroadcastChannel<T>, initial: T) -> Self {
        let origin = Uuid::new_v4().to_string();
        let (slice, _) = watch::channel(initial);
        let slice = Arc::new(slice);
        let shutdown = CancellationToken::new();

        tokio::spawn(merge_incoming(
            channel.tx.subscribe(),
            origin.clone(),
            Arc::clone(&slice),
            shutdown.clone(),
        ));
        debug!(origin = %origin, "Joined broadcast channel");

        Self {
            origin,
            channel: channel.clone(),
            slice,
            shutdown,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Apply a local change and republish it. Unchanged values are not sent.
    pub fn publish(&self, value: T) {
        let changed = self.slice.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value.clone();
                true
            }
        });
        if !changed {
            return;
        }

        let envelope = Envelope {
            origin: self.origin.clone(),
            payload: value,
        };
        match self.channel.tx.send(envelope) {
            Ok(receivers) => trace!(receivers, "Broadcast state change"),
            // Only this tab is listening.
            Err(_) => trace!("No other tabs listening"),
        }
    }

    /// Current local value.
    pub fn current(&self) -> T {
        self.slice.borrow().clone()
    }

    /// Observe local value changes, from either this tab or others.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.slice.subscribe()
    }

    /// Stop merging incoming changes.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

impl<T> Drop for CrossTabBroadcaster<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn merge_incoming<T>(
    mut rx: broadcast::Receiver<Envelope<T>>,
    origin: String,
    slice: Arc<watch::Sender<T>>,
    shutdown: CancellationToken,
) where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            received = rx.recv() => match received {
                Ok(envelope) if envelope.origin == origin => {}
                Ok(envelope) => {
                    debug!(from = %envelope.origin, "Merging state from another tab");
                    slice.send_replace(envelope.payload);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Lagged behind other tabs, newer state follows");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!(origin = %origin, "Left broadcast channel");
}
