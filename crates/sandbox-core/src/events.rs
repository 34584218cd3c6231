//! Broadcast hub for session lifecycle events.

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::RemoteError;

/// Default number of events buffered per subscriber.
const EVENT_CAPACITY: usize = 1024;

/// Lifecycle event emitted by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Transport connected; authentication is sent right after.
    Connect,
    /// Transport disconnected.
    Disconnect { reason: String },
    /// Transport reconnected.
    Reconnect { attempt: u32 },
    /// Connection-level or fatal error, already translated.
    Error(RemoteError),
}

impl SessionEvent {
    /// Event name as listeners know it.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::Reconnect { .. } => "reconnect",
            Self::Error(_) => "error",
        }
    }
}

/// Event hub with any number of live listeners.
///
/// Publishing never fails: events with no listener are dropped.
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    /// Create a hub with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CAPACITY)
    }

    /// Create a hub buffering `capacity` events per listener.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to every live listener.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.sender.send(event); // no listeners is fine
    }

    /// Get a receiver for live events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Number of live listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Stream of live events, skipping any a slow listener missed.
    #[must_use]
    pub fn stream(&self) -> futures::stream::BoxStream<'static, SessionEvent> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|res| async move {
                match res {
                    Ok(event) => Some(event),
                    Err(e) => {
                        tracing::warn!("Session event listener lagged: {e}");
                        None
                    }
                }
            })
            .boxed()
    }

    /// Stream of translated errors only.
    #[must_use]
    pub fn error_stream(&self) -> futures::stream::BoxStream<'static, RemoteError> {
        self.stream()
            .filter_map(|event| async move {
                match event {
                    SessionEvent::Error(e) => Some(e),
                    _ => None,
                }
            })
            .boxed()
    }
}
