//! Connection manager.
//!
//! A single actor task owns the socket, the connection state machine, the
//! outbound queue and the heartbeat monitor. Everything else talks to it
//! through [`ConnectionManager`], a cloneable handle that sends commands and
//! reads state/health snapshots published on watch channels.
//!
//! State machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> {Reconnecting, Errored} -> Connecting -> ...
//! ```
//!
//! `Disconnected` is both the initial state and the state after an
//! intentional `disconnect()`. `Errored` is terminal once the reconnect
//! budget is spent; only an explicit `connect()` resumes.

use crate::config::TransportConfig;
use crate::error::{WsError, WsResult};
use crate::events::{EventBus, EventKind, TransportEvent};
use crate::heartbeat::{HealthState, HealthVerdict, HeartbeatMonitor};
use crate::message::{Frame, InboundFrame};
use crate::message_queue::MessageQueue;
use crate::pending::PendingRequestTable;
use crate::socket::{Connector, SocketPair, WireMessage, ABNORMAL_CLOSURE, NORMAL_CLOSURE};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tether_telemetry::Metrics;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Errored,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Errored => "errored",
        }
    }

    /// Whether `self -> next` is a defined edge of the state machine.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionStatus::*;
        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected | Reconnecting | Errored, Connecting)
                | (Connecting, Connected | Errored)
                | (Connected, Reconnecting | Errored)
                | (Errored, Reconnecting)
                | (Reconnecting, Errored)
        )
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection snapshot. Written only by the connection actor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub session_id: Option<String>,
    /// Generated per successful connection.
    pub connection_id: Option<String>,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_disconnected_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    pub queued_messages: usize,
}

impl ConnectionState {
    fn initial(max_reconnect_attempts: u32) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            session_id: None,
            connection_id: None,
            last_connected_at: None,
            last_disconnected_at: None,
            last_error: None,
            reconnect_attempts: 0,
            max_reconnect_attempts,
            queued_messages: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

enum Command {
    Connect {
        session_id: String,
        reply: oneshot::Sender<WsResult<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Send {
        payload: String,
    },
    SetVisibility(bool),
}

/// Handle to the connection actor.
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    health_rx: watch::Receiver<HealthState>,
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    /// Spawn the connection actor. Must be called within a tokio runtime.
    pub fn spawn(
        config: TransportConfig,
        connector: Arc<dyn Connector>,
        pending: Arc<PendingRequestTable>,
        events: Arc<EventBus>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (handshake_tx, handshake_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) =
            watch::channel(ConnectionState::initial(config.max_reconnect_attempts));
        let (health_tx, health_rx) = watch::channel(HealthState::default());
        let shutdown_token = CancellationToken::new();

        let actor = ConnectionActor {
            queue: MessageQueue::new(config.queue_capacity, config.queue_max_retries),
            monitor: HeartbeatMonitor::new(
                config.heartbeat_interval(),
                config.pong_stale_after(),
                config.connection_dead_after(),
            ),
            state: ConnectionState::initial(config.max_reconnect_attempts),
            config,
            connector,
            pending,
            events,
            commands: commands_rx,
            handshake_tx,
            handshake_rx,
            handshake_task: None,
            generation: 0,
            connect_waiters: Vec::new(),
            state_tx,
            health_tx,
            socket: None,
            reconnect_at: None,
            heartbeat_start_at: None,
            heartbeat_timer: None,
            health_timer: None,
            visible: true,
            shutdown: shutdown_token.clone(),
        };
        tokio::spawn(actor.run());

        Self {
            commands: commands_tx,
            state_rx,
            health_rx,
            shutdown_token,
        }
    }

    /// Connect to `session_id`.
    ///
    /// Succeeds immediately if already connected to the same session.
    /// A failed handshake returns the error and leaves a reconnect scheduled.
    pub async fn connect(&self, session_id: impl Into<String>) -> WsResult<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Connect {
            session_id: session_id.into(),
            reply,
        })?;
        rx.await.map_err(|_| WsError::Closed)?
    }

    /// Intentional teardown: normal closure, pending requests rejected with
    /// [`WsError::Closed`], timers stopped, state `Disconnected`.
    pub async fn disconnect(&self) -> WsResult<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Disconnect { reply })?;
        rx.await.map_err(|_| WsError::Closed)
    }

    /// Send a serialized frame, queueing it if the socket is not connected.
    pub fn send_raw(&self, payload: String) -> WsResult<()> {
        self.command(Command::Send { payload })
    }

    /// Host visibility. Heartbeat timers only run while visible.
    pub fn set_visibility(&self, visible: bool) -> WsResult<()> {
        self.command(Command::SetVisibility(visible))
    }

    /// Current connection snapshot.
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Current health snapshot.
    pub fn health(&self) -> HealthState {
        self.health_rx.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Receiver that observes every health change.
    pub fn watch_health(&self) -> watch::Receiver<HealthState> {
        self.health_rx.clone()
    }

    /// Stop the actor after an intentional teardown.
    pub fn shutdown(&self) {
        info!("ConnectionManager shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    fn command(&self, command: Command) -> WsResult<()> {
        self.commands.send(command).map_err(|_| WsError::Closed)
    }
}

struct ConnectionActor {
    config: TransportConfig,
    connector: Arc<dyn Connector>,
    pending: Arc<PendingRequestTable>,
    events: Arc<EventBus>,
    commands: mpsc::UnboundedReceiver<Command>,
    handshake_tx: mpsc::UnboundedSender<(u64, WsResult<SocketPair>)>,
    handshake_rx: mpsc::UnboundedReceiver<(u64, WsResult<SocketPair>)>,
    handshake_task: Option<JoinHandle<()>>,
    /// Incremented per handshake; stale handshake results are discarded.
    generation: u64,
    connect_waiters: Vec<oneshot::Sender<WsResult<()>>>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    health_tx: watch::Sender<HealthState>,
    socket: Option<SocketPair>,
    queue: MessageQueue,
    monitor: HeartbeatMonitor,
    reconnect_at: Option<Instant>,
    heartbeat_start_at: Option<Instant>,
    heartbeat_timer: Option<Interval>,
    health_timer: Option<Interval>,
    visible: bool,
    shutdown: CancellationToken,
}

impl ConnectionActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    info!("Shutdown signal received in connection actor");
                    self.teardown_intentional().await;
                    break;
                }

                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            debug!("All connection handles dropped");
                            self.teardown_intentional().await;
                            break;
                        }
                    }
                }

                Some((generation, result)) = self.handshake_rx.recv() => {
                    self.handle_handshake(generation, result).await;
                }

                inbound = next_inbound(&mut self.socket) => {
                    self.handle_inbound(inbound).await;
                }

                () = sleep_until_opt(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.handle_reconnect_timer();
                }

                () = sleep_until_opt(self.heartbeat_start_at) => {
                    self.heartbeat_start_at = None;
                    self.start_heartbeat_timers();
                }

                _ = tick_opt(&mut self.heartbeat_timer) => {
                    self.send_heartbeat().await;
                }

                _ = tick_opt(&mut self.health_timer) => {
                    self.evaluate_health().await;
                }
            }
        }
        debug!("Connection actor stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { session_id, reply } => self.connect(session_id, reply).await,
            Command::Disconnect { reply } => {
                self.teardown_intentional().await;
                let _ = reply.send(());
            }
            Command::Send { payload } => self.send_or_enqueue(payload).await,
            Command::SetVisibility(visible) => self.set_visibility(visible).await,
        }
    }

    async fn connect(&mut self, session_id: String, reply: oneshot::Sender<WsResult<()>>) {
        let same_session = self.state.session_id.as_deref() == Some(session_id.as_str());

        match self.state.status {
            ConnectionStatus::Connected if same_session => {
                debug!(session_id = %session_id, "Already connected");
                let _ = reply.send(Ok(()));
                return;
            }
            ConnectionStatus::Connecting if same_session => {
                self.connect_waiters.push(reply);
                return;
            }
            _ => {}
        }

        if !same_session && self.state.status != ConnectionStatus::Disconnected {
            info!(
                from = ?self.state.session_id,
                to = %session_id,
                "Switching session, closing current connection"
            );
            self.teardown_intentional().await;
        }

        // Explicit connect always restores the full reconnect budget.
        self.reconnect_at = None;
        self.state.reconnect_attempts = 0;
        self.state.session_id = Some(session_id);
        self.connect_waiters.push(reply);
        self.begin_handshake();
    }

    fn begin_handshake(&mut self) {
        let Some(session_id) = self.state.session_id.clone() else {
            return;
        };
        if let Some(task) = self.handshake_task.take() {
            task.abort();
        }

        self.generation += 1;
        let generation = self.generation;
        self.transition(ConnectionStatus::Connecting);

        let connector = Arc::clone(&self.connector);
        let tx = self.handshake_tx.clone();
        let timeout = self.config.connect_timeout();
        self.handshake_task = Some(tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, connector.connect(&session_id)).await
            {
                Ok(result) => result,
                Err(_) => Err(WsError::Connection(format!(
                    "handshake timed out after {}ms",
                    timeout.as_millis()
                ))),
            };
            let _ = tx.send((generation, result));
        }));
    }

    async fn handle_handshake(&mut self, generation: u64, result: WsResult<SocketPair>) {
        if generation != self.generation || self.state.status != ConnectionStatus::Connecting {
            debug!(generation, "Discarding stale handshake result");
            return;
        }
        self.handshake_task = None;

        match result {
            Ok(socket) => {
                let connection_id = Uuid::new_v4().to_string();
                self.socket = Some(socket);
                self.state.connection_id = Some(connection_id.clone());
                self.state.last_connected_at = Some(Utc::now());
                self.state.last_error = None;
                self.state.reconnect_attempts = 0;
                self.reconnect_at = None;
                self.transition(ConnectionStatus::Connected);

                let session_id = self.state.session_id.clone().unwrap_or_default();
                info!(session_id = %session_id, connection_id = %connection_id, "Connected");
                self.events.emit(TransportEvent::Connected {
                    session_id,
                    connection_id,
                });

                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }

                self.flush_queue().await;

                // Heartbeats start after a stabilization delay so the initial
                // handshake traffic cannot produce false failures.
                self.monitor.restart();
                self.publish_health();
                if self.visible {
                    self.heartbeat_start_at =
                        Some(Instant::now() + self.config.heartbeat_start_delay());
                }
            }
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, "Connection attempt failed");
                self.state.last_error = Some(message.clone());
                self.transition(ConnectionStatus::Errored);

                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Err(WsError::Connection(message.clone())));
                }
                self.schedule_reconnect("handshake");
            }
        }
    }

    async fn flush_queue(&mut self) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };
        if self.queue.is_empty() {
            return;
        }

        let report = self.queue.flush(socket.sink.as_mut()).await;
        info!(
            sent = report.sent,
            requeued = report.requeued,
            dropped = report.dropped,
            "Message queue flushed"
        );
        self.publish_state();
    }

    async fn send_or_enqueue(&mut self, payload: String) {
        let connected = self.state.status == ConnectionStatus::Connected;
        match self.socket.as_mut() {
            Some(socket) if connected => {
                if let Err(e) = socket.sink.send(WireMessage::Text(payload.clone())).await {
                    warn!(error = %e, "Send failed, message queued");
                    self.queue.enqueue(payload);
                    self.connection_lost(ABNORMAL_CLOSURE, e.to_string(), "error");
                }
            }
            _ => {
                debug!(status = %self.state.status, "Not connected, message queued");
                self.queue.enqueue(payload);
                self.publish_state();
            }
        }
    }

    async fn set_visibility(&mut self, visible: bool) {
        if self.visible == visible {
            return;
        }
        self.visible = visible;

        if !visible {
            debug!("Hidden, heartbeat timers stopped");
            self.stop_heartbeat_timers();
        } else if self.state.status == ConnectionStatus::Connected {
            debug!("Visible again, heartbeat restarted");
            self.monitor.restart();
            self.publish_health();
            self.start_heartbeat_timers();
        }
    }

    async fn handle_inbound(&mut self, inbound: Option<WsResult<WireMessage>>) {
        match inbound {
            Some(Ok(WireMessage::Text(text))) => self.route_text(&text),
            Some(Ok(WireMessage::Close { code, reason })) if code == NORMAL_CLOSURE => {
                info!(code, %reason, "Connection closed normally by server");
                self.closed_by_server(code, reason);
            }
            Some(Ok(WireMessage::Close { code, reason })) => {
                warn!(code, %reason, "Connection closed abnormally by server");
                self.connection_lost(code, reason, "closed");
            }
            Some(Err(e)) => {
                error!(error = %e, "Socket read error");
                self.connection_lost(ABNORMAL_CLOSURE, e.to_string(), "error");
            }
            None => {
                warn!("Socket stream ended");
                self.connection_lost(ABNORMAL_CLOSURE, "stream ended".to_string(), "closed");
            }
        }
    }

    fn route_text(&mut self, text: &str) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                Metrics::frame_malformed();
                return;
            }
        };

        if self.events.has_subscribers(EventKind::Message) {
            self.events.emit(TransportEvent::Message(frame.clone()));
        }

        match InboundFrame::classify(frame) {
            Ok(InboundFrame::Response {
                request_id,
                outcome,
            }) => {
                self.pending.complete(&request_id, outcome);
            }
            Ok(InboundFrame::BatchResponse { batch_id, outcome }) => {
                self.pending.complete_batch(&batch_id, outcome);
            }
            Ok(InboundFrame::Pong) => {
                self.monitor.record_pong(Instant::now());
                if let Some(latency) = self.monitor.snapshot().latency_ms {
                    Metrics::heartbeat_latency(latency);
                }
                self.publish_health();
            }
            Ok(InboundFrame::Event(frame)) => {
                self.events.emit(TransportEvent::Push(frame));
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                Metrics::frame_malformed();
            }
        }
    }

    fn handle_reconnect_timer(&mut self) {
        match self.state.status {
            ConnectionStatus::Reconnecting => {
                info!(
                    attempt = self.state.reconnect_attempts,
                    "Reconnect timer fired"
                );
                self.begin_handshake();
            }
            status => {
                debug!(%status, "Reconnect timer fired but no longer needed");
            }
        }
    }

    /// Schedule the next reconnect, or give up once the budget is spent.
    ///
    /// A reconnect that is already scheduled is left alone.
    fn schedule_reconnect(&mut self, reason: &str) {
        if self.reconnect_at.is_some() {
            debug!("Reconnect already scheduled");
            return;
        }

        let attempts = self.state.reconnect_attempts;
        if !self.config.allows_reconnect(attempts) {
            error!(attempts, "Max reconnection attempts reached");
            self.state.last_error = Some(format!(
                "max reconnection attempts reached ({attempts})"
            ));
            self.transition(ConnectionStatus::Errored);
            return;
        }

        let delay = self.config.backoff_delay(attempts);
        self.state.reconnect_attempts = attempts + 1;
        self.transition(ConnectionStatus::Reconnecting);
        Metrics::ws_reconnect(reason);
        warn!(
            attempt = self.state.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            reason,
            "Reconnecting"
        );
        self.reconnect_at = Some(Instant::now() + delay);
    }

    /// Abnormal loss of the connection: drop the socket and reconnect.
    fn connection_lost(&mut self, code: u16, reason: String, metric_reason: &str) {
        self.socket = None;
        self.stop_heartbeat_timers();
        self.monitor.restart();
        self.publish_health();
        self.state.last_disconnected_at = Some(Utc::now());
        self.state.last_error = Some(reason.clone());

        self.pending
            .reject_all(|| WsError::Connection("connection lost".to_string()));
        self.events.emit(TransportEvent::Disconnected {
            code,
            reason,
            intentional: false,
        });
        self.schedule_reconnect(metric_reason);
    }

    /// Normal closure initiated by the server: no reconnect.
    fn closed_by_server(&mut self, code: u16, reason: String) {
        self.socket = None;
        self.stop_heartbeat_timers();
        self.monitor.reset();
        self.publish_health();
        self.state.last_disconnected_at = Some(Utc::now());
        self.state.reconnect_attempts = 0;

        self.pending.reject_all(|| WsError::Closed);
        self.transition(ConnectionStatus::Disconnected);
        self.events.emit(TransportEvent::Disconnected {
            code,
            reason,
            intentional: true,
        });
    }

    /// Intentional teardown. Clears every timer this actor owns.
    async fn teardown_intentional(&mut self) {
        if let Some(task) = self.handshake_task.take() {
            task.abort();
        }
        self.generation += 1;
        self.reconnect_at = None;
        self.stop_heartbeat_timers();
        self.monitor.reset();
        self.publish_health();

        let had_socket = if let Some(mut socket) = self.socket.take() {
            let close = WireMessage::Close {
                code: NORMAL_CLOSURE,
                reason: "client disconnect".to_string(),
            };
            if let Err(e) = socket.sink.send(close).await {
                debug!(error = %e, "Failed to send close frame");
            }
            true
        } else {
            false
        };

        let rejected = self.pending.reject_all(|| WsError::Closed);
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(WsError::Closed));
        }

        let was_active = self.state.status != ConnectionStatus::Disconnected;
        if had_socket {
            self.state.last_disconnected_at = Some(Utc::now());
        }
        self.state.reconnect_attempts = 0;
        self.transition(ConnectionStatus::Disconnected);

        if was_active {
            info!(rejected, "Disconnected");
            self.events.emit(TransportEvent::Disconnected {
                code: NORMAL_CLOSURE,
                reason: "client disconnect".to_string(),
                intentional: true,
            });
        }
    }

    fn start_heartbeat_timers(&mut self) {
        if self.state.status != ConnectionStatus::Connected || !self.visible {
            return;
        }
        let heartbeat_every = self.config.heartbeat_interval();
        let check_every = self.config.health_check_interval();

        // First heartbeat goes out immediately.
        let mut heartbeat = interval(heartbeat_every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut health = interval_at(Instant::now() + check_every, check_every);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.heartbeat_start_at = None;
        self.heartbeat_timer = Some(heartbeat);
        self.health_timer = Some(health);
        debug!(
            heartbeat_ms = heartbeat_every.as_millis() as u64,
            check_ms = check_every.as_millis() as u64,
            "Heartbeat timers started"
        );
    }

    fn stop_heartbeat_timers(&mut self) {
        self.heartbeat_start_at = None;
        self.heartbeat_timer = None;
        self.health_timer = None;
    }

    async fn send_heartbeat(&mut self) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };
        let payload = match Frame::heartbeat().to_text() {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to encode heartbeat");
                return;
            }
        };

        match socket.sink.send(WireMessage::Text(payload)).await {
            Ok(()) => {
                self.monitor.record_heartbeat_sent(Instant::now());
                self.publish_health();
            }
            Err(e) => {
                warn!(error = %e, "Heartbeat send failed");
                self.connection_lost(ABNORMAL_CLOSURE, e.to_string(), "error");
            }
        }
    }

    async fn evaluate_health(&mut self) {
        let verdict = self.monitor.evaluate(Instant::now());
        self.publish_health();

        if verdict == HealthVerdict::Dead {
            // The socket may still look open; liveness wins.
            self.connection_lost(
                ABNORMAL_CLOSURE,
                "heartbeat timeout".to_string(),
                "heartbeat",
            );
        }
    }

    fn transition(&mut self, next: ConnectionStatus) {
        let current = self.state.status;
        if current != next && !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "Rejected undefined state transition");
            return;
        }
        if current != next {
            debug!(from = %current, to = %next, "State transition");
        }
        self.state.status = next;
        if next != ConnectionStatus::Connected {
            self.state.connection_id = None;
        }
        self.publish_state();
    }

    fn publish_state(&mut self) {
        self.state.queued_messages = self.queue.len();
        Metrics::ws_state_set(self.state.status.as_str());

        let changed = *self.state_tx.borrow() != self.state;
        if changed {
            self.state_tx.send_replace(self.state.clone());
            self.events
                .emit(TransportEvent::StateChanged(self.state.clone()));
        }
    }

    fn publish_health(&mut self) {
        let snapshot = self.monitor.snapshot();
        let changed = *self.health_tx.borrow() != snapshot;
        if changed {
            self.health_tx.send_replace(snapshot.clone());
            self.events.emit(TransportEvent::HealthChanged(snapshot));
        }
    }
}

async fn next_inbound(socket: &mut Option<SocketPair>) -> Option<WsResult<WireMessage>> {
    match socket {
        Some(socket) => socket.stream.next().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick_opt(timer: &mut Option<Interval>) -> Instant {
    match timer {
        Some(timer) => timer.tick().await,
        None => std::future::pending().await,
    }
}
