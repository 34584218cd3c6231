//! Session lifecycle: connection state, authentication and event re-emission.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use futures::future::BoxFuture;
use sandbox_core::{
    ClientError, EventHub, RemoteError, SessionEvent, Transport, TransportEvent,
};
use serde_json::Value;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, error, trace, warn};

use crate::{RemoteCalls, config::{Credential, SessionConfig}};

/// Shared session state, also owned by the dispatch task.
pub(crate) struct Inner {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) calls: RemoteCalls,
    credential: Credential,
    connected: AtomicBool,
    events: EventHub,
}

/// Client session with a remote sandbox host.
///
/// Owns exactly one transport. Operations may be issued immediately after
/// construction; the transport buffers them until it is connected.
/// Dropping the session stops event dispatch and fails calls still waiting.
pub struct Session {
    pub(crate) inner: Arc<Inner>,
    dispatcher: JoinHandle<()>,
}

impl Session {
    /// Create a session over `transport`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(transport: impl Transport + 'static, config: SessionConfig) -> Self {
        Self::with_transport(Arc::new(transport), config)
    }

    /// Create a session over a shared transport handle.
    ///
    /// The session must be the transport's only user: it takes the control
    /// queue, and a transport whose queue is gone yields a closed session.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        let control = transport.take_control().unwrap_or_else(|| {
            error!("Transport control queue already taken, session starts closed");
            mpsc::unbounded_channel().1
        });
        let timeout = config.timeout();

        let inner = Arc::new(Inner {
            calls: RemoteCalls::new(Arc::clone(&transport), timeout),
            transport,
            credential: config.credential,
            connected: AtomicBool::new(false),
            events: EventHub::with_capacity(config.event_capacity),
        });

        let dispatcher = tokio::spawn(dispatch(Arc::clone(&inner), control));

        Self { inner, dispatcher }
    }

    /// Connect to a sandbox host over WebSocket.
    ///
    /// Must be called from within a tokio runtime.
    #[cfg(feature = "websocket")]
    #[must_use]
    pub fn connect(
        transport: sandbox_transport::WebSocketConfig,
        config: SessionConfig,
    ) -> Self {
        Self::new(sandbox_transport::WebSocketTransport::connect(transport), config)
    }

    /// Whether the transport reported a live connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Get a receiver for session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Stream of session events.
    #[must_use]
    pub fn events(&self) -> futures::stream::BoxStream<'static, SessionEvent> {
        self.inner.events.stream()
    }

    /// Issue a raw remote call.
    ///
    /// The message is emitted before this returns.
    pub fn call(&self, name: &str, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ClientError>> {
        self.inner.calls.call(name, args)
    }

    /// Number of calls waiting for an acknowledgement.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.inner.calls.pending_count()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispatcher.abort();
        self.inner.connected.store(false, Ordering::SeqCst);
        let abandoned = self.inner.calls.abandon_all();
        if abandoned > 0 {
            debug!(abandoned, "session dropped");
        }
    }
}

impl Inner {
    fn handle(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connect => {
                debug!("connect");
                self.connected.store(true, Ordering::SeqCst);
                self.events.publish(SessionEvent::Connect);
                self.authenticate();
            }
            TransportEvent::Disconnect { reason } => {
                debug!(%reason, "disconnect");
                self.connected.store(false, Ordering::SeqCst);
                self.events.publish(SessionEvent::Disconnect { reason });
            }
            TransportEvent::Reconnect { attempt } => {
                debug!(attempt, "reconnect");
                self.events.publish(SessionEvent::Reconnect { attempt });
            }
            TransportEvent::Error(payload) => {
                let error = RemoteError::from_value(payload);
                debug!(%error, "error");
                self.events.publish(SessionEvent::Error(error));
            }
            TransportEvent::Fatal(payload) => {
                let error = RemoteError::from_value(payload);
                warn!(%error, "fatal error from sandbox host");
                self.events.publish(SessionEvent::Error(error));
            }
            TransportEvent::Ack { id, args } => {
                self.calls.settle(id, args);
            }
            TransportEvent::Message { name, .. } => {
                // Not expected on the control queue; process handles read these.
                trace!(event = %name, "message");
            }
        }
    }

    fn authenticate(&self) {
        let credential = self.credential.resolve();
        if let Err(e) = self.transport.emit("auth", vec![credential], None) {
            error!("Failed to send auth: {e}");
        }
    }
}

async fn dispatch(inner: Arc<Inner>, mut control: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = control.recv().await {
        inner.handle(event);
    }

    inner.connected.store(false, Ordering::SeqCst);
    let abandoned = inner.calls.abandon_all();
    debug!(abandoned, "transport closed");
}
