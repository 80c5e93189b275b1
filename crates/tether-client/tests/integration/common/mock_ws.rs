//! Mock session WebSocket server.
//!
//! Answers `heartbeat` with `pong`, correlated requests with `response`
//! frames and `batch` frames with `batch_response`. Can go silent (no
//! answers) or drop every open connection.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};

#[derive(Default)]
struct Shared {
    messages: Mutex<Vec<Value>>,
    sessions: Mutex<Vec<String>>,
    connections: AtomicU32,
    silent: AtomicBool,
}

pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    drop_tx: broadcast::Sender<()>,
    shared: Arc<Shared>,
}

impl MockWsServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared::default());
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (drop_tx, _) = broadcast::channel::<()>(4);

        let accept_shared = shared.clone();
        let accept_drop = drop_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            accept_shared.clone(),
                            accept_drop.subscribe(),
                        ));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            drop_tx,
            shared,
        }
    }

    /// Streaming endpoint URL, without the session query.
    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn connection_count(&self) -> u32 {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Session ids seen in handshake queries, in connection order.
    pub async fn sessions(&self) -> Vec<String> {
        self.shared.sessions.lock().await.clone()
    }

    /// Every non-heartbeat frame received.
    pub async fn received_frames(&self) -> Vec<Value> {
        self.shared.messages.lock().await.clone()
    }

    /// Stop answering requests; heartbeats are still answered.
    pub fn set_silent(&self, silent: bool) {
        self.shared.silent.store(silent, Ordering::SeqCst);
    }

    /// Drop every open connection without a close frame.
    pub fn drop_connections(&self) {
        let _ = self.drop_tx.send(());
    }

    /// Stop accepting and drop open connections.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.drop_tx.send(());
    }
}

fn session_from_query(query: Option<&str>) -> String {
    query
        .unwrap_or_default()
        .split('&')
        .find_map(|pair| pair.strip_prefix("session_id="))
        .unwrap_or_default()
        .to_string()
}

async fn handle_connection(
    stream: TcpStream,
    shared: Arc<Shared>,
    mut drop_rx: broadcast::Receiver<()>,
) {
    let mut session = String::new();
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        session = session_from_query(req.uri().query());
        Ok(resp)
    };
    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    shared.connections.fetch_add(1, Ordering::SeqCst);
    shared.sessions.lock().await.push(session);

    let (mut write, mut read) = ws_stream.split();

    loop {
        let msg = tokio::select! {
            _ = drop_rx.recv() => return,
            msg = read.next() => msg,
        };
        let text = match msg {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
            Some(Ok(_)) => continue,
        };
        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
            continue;
        };

        let frame_type = frame["type"].as_str().unwrap_or_default().to_string();
        if frame_type == "heartbeat" {
            let pong = json!({"type": "pong", "timestamp": 0});
            let _ = write.send(Message::Text(pong.to_string())).await;
            continue;
        }

        shared.messages.lock().await.push(frame.clone());
        if shared.silent.load(Ordering::SeqCst) {
            continue;
        }

        let reply = if frame_type == "batch" {
            let count = frame["items"].as_array().map_or(0, Vec::len);
            Some(json!({
                "type": "batch_response",
                "batch_id": frame["batch_id"],
                "status": "success",
                "data": (0..count).map(|i| json!({"ok": i})).collect::<Vec<_>>(),
            }))
        } else if let Some(request_id) = frame["request_id"].as_str() {
            Some(json!({
                "type": "response",
                "request_id": request_id,
                "status": "success",
                "data": {"via": "ws", "op": frame_type},
            }))
        } else {
            None
        };

        if let Some(reply) = reply {
            let _ = write.send(Message::Text(reply.to_string())).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_query() {
        assert_eq!(session_from_query(Some("a=1&session_id=s9")), "s9");
        assert_eq!(session_from_query(None), "");
    }
}
