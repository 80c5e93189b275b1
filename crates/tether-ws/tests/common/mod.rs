//! Scripted in-process connector for transport tests.
//!
//! Each accepted handshake yields a [`MockPeer`] playing the server side of
//! that socket: it sees everything the client sends and can push frames,
//! closes and errors back.

#![allow(dead_code)]

use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether_ws::{
    BoxFuture, Connector, FrameSink, SocketPair, TransportConfig, WireMessage, WsError, WsResult,
};
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;

/// How the next handshakes behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Accept,
    Refuse,
    /// Block until [`MockConnector::open_gate`] is called, then accept.
    Gated,
}

pub struct MockConnector {
    behavior: Mutex<Behavior>,
    gate: Notify,
    attempts: AtomicUsize,
    attempt_times: Mutex<Vec<Instant>>,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl MockConnector {
    pub fn new(behavior: Behavior) -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, peers_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            behavior: Mutex::new(behavior),
            gate: Notify::new(),
            attempts: AtomicUsize::new(0),
            attempt_times: Mutex::new(Vec::new()),
            peers,
        });
        (connector, peers_rx)
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn open_gate(&self) {
        self.gate.notify_one();
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempt_times.lock().clone()
    }
}

impl Connector for MockConnector {
    fn connect(&self, session_id: &str) -> BoxFuture<'_, WsResult<SocketPair>> {
        let session_id = session_id.to_string();
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.attempt_times.lock().push(Instant::now());

            let behavior = *self.behavior.lock();
            match behavior {
                Behavior::Refuse => {
                    return Err(WsError::Connection("connection refused".to_string()))
                }
                Behavior::Gated => self.gate.notified().await,
                Behavior::Accept => {}
            }

            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            let stream = futures_util::stream::unfold(in_rx, |mut rx| async move {
                rx.recv().await.map(|msg| (msg, rx))
            })
            .boxed();

            let _ = self.peers.send(MockPeer {
                session_id,
                outbound: out_rx,
                inbound: Some(in_tx),
            });

            Ok(SocketPair {
                sink: Box::new(MockSink { tx: out_tx }),
                stream,
            })
        })
    }
}

struct MockSink {
    tx: mpsc::UnboundedSender<WireMessage>,
}

impl FrameSink for MockSink {
    fn send(&mut self, msg: WireMessage) -> BoxFuture<'_, WsResult<()>> {
        let result = self
            .tx
            .send(msg)
            .map_err(|_| WsError::Connection("peer gone".to_string()));
        Box::pin(async move { result })
    }
}

/// Server side of one mock socket.
pub struct MockPeer {
    pub session_id: String,
    outbound: mpsc::UnboundedReceiver<WireMessage>,
    inbound: Option<mpsc::UnboundedSender<WsResult<WireMessage>>>,
}

impl MockPeer {
    /// Next message the client sent, or `None` once the client dropped the socket.
    pub async fn recv(&mut self) -> Option<WireMessage> {
        self.outbound.recv().await
    }

    /// Next non-heartbeat JSON frame from the client.
    pub async fn recv_frame(&mut self) -> Value {
        loop {
            match self.recv().await {
                Some(WireMessage::Text(text)) => {
                    let value: Value = serde_json::from_str(&text).unwrap();
                    if value["type"] != "heartbeat" {
                        return value;
                    }
                }
                Some(other) => panic!("expected text frame, got {other:?}"),
                None => panic!("client closed the socket"),
            }
        }
    }

    /// Next heartbeat from the client.
    pub async fn recv_heartbeat(&mut self) -> Value {
        loop {
            if let Some(WireMessage::Text(text)) = self.recv().await {
                let value: Value = serde_json::from_str(&text).unwrap();
                if value["type"] == "heartbeat" {
                    return value;
                }
            } else {
                panic!("client closed the socket");
            }
        }
    }

    pub fn push_text(&self, text: impl Into<String>) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Ok(WireMessage::Text(text.into())));
        }
    }

    pub fn push_json(&self, value: Value) {
        self.push_text(value.to_string());
    }

    pub fn pong(&self) {
        self.push_json(json!({"type": "pong", "timestamp": 0}));
    }

    pub fn respond(&self, request_id: &str, data: Value) {
        self.push_json(json!({
            "type": "response",
            "request_id": request_id,
            "status": "success",
            "data": data,
        }));
    }

    pub fn respond_error(&self, request_id: &str, message: &str) {
        self.push_json(json!({
            "type": "response",
            "request_id": request_id,
            "status": "error",
            "error": message,
        }));
    }

    pub fn close(&self, code: u16, reason: &str) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Ok(WireMessage::Close {
                code,
                reason: reason.to_string(),
            }));
        }
    }

    pub fn fail(&self, message: &str) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Err(WsError::Connection(message.to_string())));
        }
    }

    /// End the inbound stream without a close frame.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Answer heartbeats and requests in the background. Returns the number of
    /// requests answered so far; each response carries `{"n": <count>}`.
    pub fn spawn_responder(mut self) -> Arc<AtomicUsize> {
        let answered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&answered);
        tokio::spawn(async move {
            while let Some(msg) = self.recv().await {
                let WireMessage::Text(text) = msg else {
                    continue;
                };
                let value: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                match value["type"].as_str() {
                    Some("heartbeat") => self.pong(),
                    Some("batch") => {
                        let count = value["items"].as_array().map_or(0, Vec::len);
                        let results: Vec<Value> = (0..count).map(|i| json!({"ok": i})).collect();
                        self.push_json(json!({
                            "type": "batch_response",
                            "batch_id": value["batch_id"],
                            "status": "success",
                            "data": results,
                        }));
                    }
                    Some(_) => {
                        if let Some(id) = value["request_id"].as_str() {
                            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                            self.respond(id, json!({"n": n}));
                        }
                    }
                    None => {}
                }
            }
        });
        answered
    }
}

/// Config with short timers for tests.
pub fn test_config() -> TransportConfig {
    TransportConfig {
        heartbeat_interval_ms: 3_000,
        heartbeat_start_delay_ms: 1_000,
        ..Default::default()
    }
}

/// Wait until the watched value satisfies `predicate`.
pub async fn wait_for<T: Clone>(rx: &mut watch::Receiver<T>, predicate: impl FnMut(&T) -> bool) -> T {
    tokio::time::timeout(Duration::from_secs(600), rx.wait_for(predicate))
        .await
        .expect("condition not reached")
        .expect("sender dropped")
        .clone()
}
