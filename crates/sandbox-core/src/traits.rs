//! Core transport trait.

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use crate::TransportError;

/// Correlation identifier attached to a message that expects an acknowledgement.
pub type AckId = u64;

/// Event published by a transport to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A connection was established (first connect or after a reconnect).
    Connect,
    /// The connection was lost.
    Disconnect { reason: String },
    /// The transport reconnected after `attempt` tries.
    Reconnect { attempt: u32 },
    /// Recoverable connection-level error with its raw payload.
    Error(Value),
    /// Unrecoverable error signalled by the remote host.
    Fatal(Value),
    /// Acknowledgement for a message emitted with `ack: Some(id)`.
    Ack { id: AckId, args: Vec<Value> },
    /// Named message pushed by the remote host.
    Message { name: String, args: Vec<Value> },
}

impl TransportEvent {
    /// Lifecycle signal name, or `None` for acks and named messages.
    #[must_use]
    pub const fn signal_name(&self) -> Option<&'static str> {
        match self {
            Self::Connect => Some("connect"),
            Self::Disconnect { .. } => Some("disconnect"),
            Self::Reconnect { .. } => Some("reconnect"),
            Self::Error(_) => Some("error"),
            Self::Fatal(_) => Some("fatal"),
            Self::Ack { .. } | Self::Message { .. } => None,
        }
    }

    /// Whether the event belongs on the control queue (everything except
    /// named messages).
    #[must_use]
    pub const fn is_control(&self) -> bool {
        !matches!(self, Self::Message { .. })
    }
}

/// Persistent, full-duplex, named-message connection.
///
/// Implementations own connection establishment, reconnection, framing and
/// buffering. `emit` must not block: it enqueues one message atomically and
/// returns, so concurrent callers serialize at the enqueue.
pub trait Transport: Send + Sync {
    /// Enqueue a named message.
    ///
    /// When `ack` is set, the remote host answers with exactly one
    /// [`TransportEvent::Ack`] carrying the same id.
    ///
    /// # Errors
    /// Returns error if the message cannot be encoded or the transport is closed.
    fn emit(&self, event: &str, args: Vec<Value>, ack: Option<AckId>) -> Result<(), TransportError>;

    /// Take the control queue.
    ///
    /// Lifecycle signals and acknowledgements, in arrival order and never
    /// dropped. The queue exists from construction, so nothing signalled
    /// before the owner takes it is lost. Only the first caller gets it.
    fn take_control(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>>;

    /// Subscribe to everything the transport receives from now on.
    ///
    /// Bounded per subscriber: a receiver that falls behind skips events.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_messages_skip_control() {
        assert!(TransportEvent::Connect.is_control());
        assert!(TransportEvent::Ack { id: 1, args: vec![] }.is_control());
        assert!(TransportEvent::Fatal(Value::Null).is_control());
        assert!(
            !TransportEvent::Message {
                name: "stdout".into(),
                args: vec![],
            }
            .is_control()
        );
    }
}
