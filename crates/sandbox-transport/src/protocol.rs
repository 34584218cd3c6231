//! Wire protocol for client-server communication.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use sandbox_core::{AckId, TransportEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid binary payload: {0}")]
    InvalidBinary(String),
}

/// Frame exchanged over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Named message, optionally expecting an acknowledgement.
    Event {
        name: String,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ack: Option<AckId>,
    },
    /// Acknowledgement: `args[0]` is the error slot, `args[1]` the payload.
    Ack {
        id: AckId,
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Connection-level error.
    Error {
        #[serde(default)]
        payload: Value,
    },
    /// Unrecoverable error; the host will not serve this connection further.
    Fatal {
        #[serde(default)]
        payload: Value,
    },
}

impl Frame {
    /// Serialize to a JSON text frame.
    ///
    /// # Errors
    /// Returns error if an argument cannot be serialized.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON text frame.
    ///
    /// # Errors
    /// Returns error if the text is not a valid frame.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Convert a frame received from the remote host into a transport event.
    #[must_use]
    pub fn into_event(self) -> TransportEvent {
        match self {
            Self::Event { name, args, .. } => TransportEvent::Message { name, args },
            Self::Ack { id, args } => TransportEvent::Ack { id, args },
            Self::Error { payload } => TransportEvent::Error(payload),
            Self::Fatal { payload } => TransportEvent::Fatal(payload),
        }
    }
}

/// Message emitted by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub name: String,
    pub args: Vec<Value>,
    pub ack: Option<AckId>,
}

impl Packet {
    /// Create a new packet.
    #[must_use]
    pub fn new(name: impl Into<String>, args: Vec<Value>, ack: Option<AckId>) -> Self {
        Self {
            name: name.into(),
            args,
            ack,
        }
    }

    /// Argument at `index`, or `Value::Null`.
    #[must_use]
    pub fn arg(&self, index: usize) -> &Value {
        self.args.get(index).unwrap_or(&Value::Null)
    }
}

impl From<Packet> for Frame {
    fn from(packet: Packet) -> Self {
        Self::Event {
            name: packet.name,
            args: packet.args,
            ack: packet.ack,
        }
    }
}

/// Encode a byte buffer for the wire (base64 string).
#[must_use]
pub fn encode_binary(data: &[u8]) -> Value {
    Value::String(BASE64.encode(data))
}

/// Decode a byte buffer from the wire.
///
/// Accepts a base64 string, an array of byte values, or a serialized
/// buffer object (`{"type": "Buffer", "data": [...]}`).
///
/// # Errors
/// Returns error if the value is none of those shapes.
pub fn decode_binary(value: &Value) -> Result<Bytes, ProtocolError> {
    match value {
        Value::String(s) => BASE64
            .decode(s)
            .map(Bytes::from)
            .map_err(|e| ProtocolError::InvalidBinary(e.to_string())),
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| ProtocolError::InvalidBinary(format!("not a byte: {v}")))
            })
            .collect::<Result<Vec<u8>, _>>()
            .map(Bytes::from),
        Value::Object(map) if map.get("type").and_then(Value::as_str) == Some("Buffer") => {
            decode_binary(map.get("data").unwrap_or(&Value::Null))
        }
        Value::Null => Ok(Bytes::new()),
        other => Err(ProtocolError::InvalidBinary(format!(
            "unexpected payload: {other}"
        ))),
    }
}
