//! Socket seam between the connection manager and the wire.
//!
//! [`Connector`] opens a session socket and hands back a [`SocketPair`]. The
//! production implementation is [`TungsteniteConnector`]; tests substitute an
//! in-process connector.

use crate::error::{WsError, WsResult};
use futures_util::stream::BoxStream;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::pin::Pin;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use url::Url;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Normal closure code.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Abnormal closure code (no close frame received).
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Transport-level message exchanged with the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Close { code: u16, reason: String },
}

/// Write half of a session socket.
pub trait FrameSink: Send {
    fn send(&mut self, msg: WireMessage) -> BoxFuture<'_, WsResult<()>>;
}

/// Read half of a session socket.
pub type FrameStream = BoxStream<'static, WsResult<WireMessage>>;

/// An open session socket.
pub struct SocketPair {
    pub sink: Box<dyn FrameSink>,
    pub stream: FrameStream,
}

/// Opens session sockets.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, session_id: &str) -> BoxFuture<'_, WsResult<SocketPair>>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connector backed by tokio-tungstenite.
///
/// The session id is passed as the `session_id` query parameter.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    url: String,
}

impl TungsteniteConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Endpoint URL with `session_id` appended as a percent-encoded query pair.
    fn session_url(&self, session_id: &str) -> WsResult<String> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| WsError::Connection(format!("invalid endpoint {}: {e}", self.url)))?;
        url.query_pairs_mut().append_pair("session_id", session_id);
        Ok(url.into())
    }
}

impl Connector for TungsteniteConnector {
    fn connect(&self, session_id: &str) -> BoxFuture<'_, WsResult<SocketPair>> {
        let url = self.session_url(session_id);
        Box::pin(async move {
            let url = url?;
            info!(url = %url, "Connecting to WebSocket");
            let (ws_stream, _response) = connect_async(url.as_str())
                .await
                .map_err(|e| WsError::Connection(e.to_string()))?;
            let (write, read) = ws_stream.split();

            let stream = read
                .filter_map(|msg| async move {
                    match msg {
                        Ok(Message::Text(text)) => Some(Ok(WireMessage::Text(text.to_string()))),
                        Ok(Message::Close(frame)) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.to_string()))
                                .unwrap_or((ABNORMAL_CLOSURE, String::new()));
                            Some(Ok(WireMessage::Close { code, reason }))
                        }
                        Ok(Message::Binary(_)) => {
                            debug!("Ignoring binary frame");
                            None
                        }
                        // Ping/pong at the transport level is answered by tungstenite itself.
                        Ok(_) => None,
                        Err(e) => Some(Err(WsError::from(e))),
                    }
                })
                .boxed();

            Ok(SocketPair {
                sink: Box::new(TungsteniteSink { write }),
                stream,
            })
        })
    }
}

struct TungsteniteSink {
    write: futures_util::stream::SplitSink<WsStream, Message>,
}

impl FrameSink for TungsteniteSink {
    fn send(&mut self, msg: WireMessage) -> BoxFuture<'_, WsResult<()>> {
        Box::pin(async move {
            let message = match msg {
                WireMessage::Text(text) => Message::Text(text.into()),
                WireMessage::Close { code, reason } => Message::Close(Some(CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.into(),
                })),
            };
            self.write.send(message).await?;
            Ok(())
        })
    }
}
