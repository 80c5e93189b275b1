//! Wire frames.
//!
//! Every frame is a JSON object
//! `{type, request_id?, batch_id?, status?, data|error, items?, timestamp}`.
//! Outbound frames are built with the constructors on [`Frame`]; inbound
//! text is classified by [`InboundFrame::parse`]. Top-level fields outside
//! the envelope are kept in [`Frame::extra`] so push frames survive intact.

use crate::error::{WsError, WsResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Frame type of an outbound liveness check.
pub const HEARTBEAT: &str = "heartbeat";
/// Frame type answering a heartbeat.
pub const PONG: &str = "pong";
/// Frame type resolving a correlated request.
pub const RESPONSE: &str = "response";
/// Frame type carrying a bundle of low-priority items.
pub const BATCH: &str = "batch";
/// Frame type resolving a batch.
pub const BATCH_RESPONSE: &str = "batch_response";

/// Status carried by response frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameStatus {
    Success,
    Error,
}

/// A single wire frame, inbound or outbound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FrameStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Value>>,
    /// Production time. Outbound frames carry Unix milliseconds; inbound
    /// values are informational and accepted in any JSON form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    /// Top-level fields outside the envelope.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Frame {
    /// Create a plain frame of the given type carrying `data`.
    pub fn new(frame_type: impl Into<String>, data: Value) -> Self {
        Self {
            frame_type: frame_type.into(),
            request_id: None,
            batch_id: None,
            status: None,
            data: Some(data),
            error: None,
            items: None,
            timestamp: Some(Value::from(Utc::now().timestamp_millis())),
            extra: Map::new(),
        }
    }

    /// Liveness check.
    pub fn heartbeat() -> Self {
        Self {
            data: None,
            ..Self::new(HEARTBEAT, Value::Null)
        }
    }

    /// Correlated request for an operation.
    pub fn request(operation: impl Into<String>, request_id: impl Into<String>, data: Value) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..Self::new(operation, data)
        }
    }

    /// Batch of low-priority items, correlated by `batch_id`.
    pub fn batch(batch_id: impl Into<String>, items: Vec<Value>) -> Self {
        Self {
            batch_id: Some(batch_id.into()),
            data: None,
            items: Some(items),
            ..Self::new(BATCH, Value::Null)
        }
    }

    /// Parse inbound wire text.
    pub fn parse(text: &str) -> WsResult<Self> {
        serde_json::from_str(text).map_err(|e| WsError::Protocol(format!("unparseable frame: {e}")))
    }

    /// Serialize to wire text.
    pub fn to_text(&self) -> WsResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Whether this frame reports a failure.
    ///
    /// An explicit `status` wins; without one, the presence of `error` means failure.
    pub fn is_error(&self) -> bool {
        match self.status {
            Some(FrameStatus::Error) => true,
            Some(FrameStatus::Success) => false,
            None => self.error.as_ref().is_some_and(|e| !e.is_null()),
        }
    }

    /// Human-readable error carried by the frame.
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Object(map)) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
            Some(other) if !other.is_null() => other.to_string(),
            _ => "unknown error".to_string(),
        }
    }
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Resolves the pending request with `request_id`.
    Response {
        request_id: String,
        outcome: Result<Value, String>,
    },
    /// Resolves the pending batch with `batch_id`.
    BatchResponse {
        batch_id: String,
        outcome: Result<Vec<Value>, String>,
    },
    /// Heartbeat acknowledgment.
    Pong,
    /// Anything else, re-emitted verbatim as a domain event.
    Event(Frame),
}

impl InboundFrame {
    /// Parse and classify inbound text.
    pub fn parse(text: &str) -> WsResult<Self> {
        Self::classify(Frame::parse(text)?)
    }

    /// Classify an already parsed frame.
    pub fn classify(frame: Frame) -> WsResult<Self> {
        match frame.frame_type.as_str() {
            PONG => Ok(Self::Pong),
            RESPONSE => {
                let request_id = frame
                    .request_id
                    .clone()
                    .ok_or_else(|| WsError::Protocol("response without request_id".to_string()))?;
                let outcome = if frame.is_error() {
                    Err(frame.error_message())
                } else {
                    Ok(frame.data.unwrap_or(Value::Null))
                };
                Ok(Self::Response {
                    request_id,
                    outcome,
                })
            }
            BATCH_RESPONSE => {
                let batch_id = frame.batch_id.clone().ok_or_else(|| {
                    WsError::Protocol("batch_response without batch_id".to_string())
                })?;
                let outcome = if frame.is_error() {
                    Err(frame.error_message())
                } else {
                    match frame.data {
                        Some(Value::Array(results)) => Ok(results),
                        None | Some(Value::Null) => Ok(Vec::new()),
                        Some(_) => {
                            return Err(WsError::Protocol(
                                "batch_response data is not an array".to_string(),
                            ))
                        }
                    }
                };
                Ok(Self::BatchResponse { batch_id, outcome })
            }
            _ => Ok(Self::Event(frame)),
        }
    }
}
