//! Typed publish/subscribe for transport events.
//!
//! Handlers are keyed by [`EventKind`]. Every registration returns a
//! [`Subscription`] that removes the handler when `unsubscribe` is called.
//! A panicking handler is logged and isolated so it never takes down the
//! receive loop.

use crate::connection::ConnectionState;
use crate::heartbeat::HealthState;
use crate::message::Frame;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::error;

/// Event categories a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    StateChanged,
    HealthChanged,
    /// Every valid inbound frame.
    Message,
    /// Inbound frames not consumed by the transport itself.
    Push,
}

/// Event payloads.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected {
        session_id: String,
        connection_id: String,
    },
    Disconnected {
        code: u16,
        reason: String,
        /// Normal closure from either side; no reconnect follows.
        intentional: bool,
    },
    StateChanged(ConnectionState),
    HealthChanged(HealthState),
    Message(Frame),
    Push(Frame),
}

impl TransportEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected { .. } => EventKind::Connected,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::StateChanged(_) => EventKind::StateChanged,
            Self::HealthChanged(_) => EventKind::HealthChanged,
            Self::Message(_) => EventKind::Message,
            Self::Push(_) => EventKind::Push,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&TransportEvent) + Send + Sync>;

/// Event bus shared by the connection manager and its clients.
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<(u64, EventHandler)>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        let counts: HashMap<&EventKind, usize> =
            handlers.iter().map(|(k, v)| (k, v.len())).collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `handler` for `kind`.
    pub fn on<F>(self: &Arc<Self>, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            kind,
            id,
            bus: Arc::downgrade(self),
        }
    }

    /// Register `handler` for push events of one frame type.
    pub fn on_push<F>(self: &Arc<Self>, frame_type: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        let frame_type = frame_type.into();
        self.on(EventKind::Push, move |event| {
            if let TransportEvent::Push(frame) = event {
                if frame.frame_type == frame_type {
                    handler(frame);
                }
            }
        })
    }

    /// Remove a handler. Returns `false` if it was already removed.
    pub fn off(&self, subscription: &Subscription) -> bool {
        self.remove(subscription.kind, subscription.id)
    }

    fn remove(&self, kind: EventKind, id: u64) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(hid, _)| *hid != id);
        before != list.len()
    }

    /// Whether anything listens for `kind`.
    pub fn has_subscribers(&self, kind: EventKind) -> bool {
        self.handlers
            .read()
            .get(&kind)
            .is_some_and(|list| !list.is_empty())
    }

    /// Deliver `event` to every handler registered for its kind.
    pub fn emit(&self, event: TransportEvent) {
        let kind = event.kind();
        // Snapshot so handlers may (un)subscribe while running.
        let handlers: Vec<EventHandler> = match self.handlers.read().get(&kind) {
            Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return,
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                error!(?kind, "Event handler panicked");
            }
        }
    }
}

/// Disposer returned by [`EventBus::on`].
#[derive(Debug)]
pub struct Subscription {
    kind: EventKind,
    id: u64,
    bus: Weak<EventBus>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove the handler. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|bus| bus.remove(self.kind, self.id))
    }
}
