//! Error taxonomy shared by transports and sessions.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Error reported by the remote host.
///
/// Carries the human-readable message plus every other field the remote
/// payload had (`code`, `errno`, `path`, ...), unchanged.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct RemoteError {
    /// Human-readable message.
    pub message: String,
    /// Remaining structured fields of the payload.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RemoteError {
    /// Create an error with just a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: Map::new(),
        }
    }

    /// Translate a raw remote error payload.
    ///
    /// Objects keep all fields except `message`; strings become the message;
    /// any other value is rendered as JSON text.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut fields) => {
                let message = match fields.remove("message") {
                    Some(Value::String(s)) => s,
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                Self { message, fields }
            }
            Value::String(s) => Self::new(s),
            Value::Null => Self::new(String::new()),
            other => Self::new(other.to_string()),
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Get a preserved field by name.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Errno-style code (`ENOENT`, `EACCES`, ...), if the remote sent one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.field("code").and_then(Value::as_str)
    }

    /// Render back into the payload shape it was translated from.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("message".into(), Value::String(self.message.clone()));
        Value::Object(map)
    }
}

/// Transport error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("Connection error: {0}")]
    Connect(String),
}

/// Error returned by a remote operation.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Session closed before the call was acknowledged")]
    Closed,
    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Invalid payload: {0}")]
    Decode(String),
}

impl ClientError {
    /// The remote error, if this failure came from the remote host.
    #[must_use]
    pub const fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(e) => Some(e),
            _ => None,
        }
    }
}
