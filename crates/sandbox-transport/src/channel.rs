//! In-process transport backed by channels.
//!
//! Useful for embedding a sandbox host in the same process and for driving
//! sessions deterministically in tests: the [`RemoteEnd`] sees every emitted
//! packet and decides when to connect, acknowledge or fail.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sandbox_core::{AckId, Transport, TransportError, TransportEvent};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use crate::{outlet::EventOutlet, protocol::Packet};

/// Default number of transport events buffered per subscriber.
const EVENT_CAPACITY: usize = 10_000;

type SharedOutlet = Arc<Mutex<Option<EventOutlet>>>;

/// Client side of an in-process connection.
pub struct ChannelTransport {
    packet_tx: mpsc::UnboundedSender<Packet>,
    events: SharedOutlet,
    control: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
}

/// Remote side of an in-process connection.
///
/// Dropping it closes the connection: subscribers see the event stream end
/// and further emits fail.
pub struct RemoteEnd {
    packet_rx: mpsc::UnboundedReceiver<Packet>,
    events: SharedOutlet,
}

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChannelTransport {
    /// Create a connected pair.
    ///
    /// Returns the transport and the remote end that drives it.
    #[must_use]
    pub fn new() -> (Self, RemoteEnd) {
        let (packet_tx, packet_rx) = mpsc::unbounded_channel();
        let (outlet, control) = EventOutlet::new(EVENT_CAPACITY);
        let events = Arc::new(Mutex::new(Some(outlet)));

        let transport = Self {
            packet_tx,
            events: Arc::clone(&events),
            control: Mutex::new(Some(control)),
        };
        let remote = RemoteEnd { packet_rx, events };

        (transport, remote)
    }
}

impl Transport for ChannelTransport {
    fn emit(&self, event: &str, args: Vec<Value>, ack: Option<AckId>) -> Result<(), TransportError> {
        self.packet_tx
            .send(Packet::new(event, args, ack))
            .map_err(|_| TransportError::Closed)
    }

    fn take_control(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        lock(&self.control).take()
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        match lock(&self.events).as_ref() {
            Some(outlet) => outlet.subscribe(),
            None => {
                // Already closed: hand out a receiver that ends immediately.
                let (_, rx) = broadcast::channel(1);
                rx
            }
        }
    }
}

impl RemoteEnd {
    /// Receive the next packet the client emitted.
    ///
    /// Returns `None` once the transport has been dropped.
    pub async fn recv(&mut self) -> Option<Packet> {
        self.packet_rx.recv().await
    }

    /// Receive a packet if one is already queued.
    pub fn try_recv(&mut self) -> Option<Packet> {
        self.packet_rx.try_recv().ok()
    }

    /// Publish a raw transport event.
    ///
    /// Returns `false` if the event reached nobody or the connection is closed.
    pub fn send(&self, event: TransportEvent) -> bool {
        lock(&self.events)
            .as_ref()
            .is_some_and(|outlet| outlet.send(event))
    }

    /// Signal a (re)established connection.
    pub fn connect(&self) -> bool {
        self.send(TransportEvent::Connect)
    }

    /// Signal a lost connection.
    pub fn disconnect(&self, reason: impl Into<String>) -> bool {
        self.send(TransportEvent::Disconnect {
            reason: reason.into(),
        })
    }

    /// Signal a successful reconnection.
    pub fn reconnect(&self, attempt: u32) -> bool {
        self.send(TransportEvent::Reconnect { attempt })
    }

    /// Signal a connection-level error.
    pub fn error(&self, payload: Value) -> bool {
        self.send(TransportEvent::Error(payload))
    }

    /// Signal an unrecoverable error.
    pub fn fatal(&self, payload: Value) -> bool {
        self.send(TransportEvent::Fatal(payload))
    }

    /// Acknowledge a packet with success.
    pub fn ack_ok(&self, id: AckId, payload: Value) -> bool {
        self.send(TransportEvent::Ack {
            id,
            args: vec![Value::Null, payload],
        })
    }

    /// Acknowledge a packet with an error payload.
    pub fn ack_err(&self, id: AckId, error: Value) -> bool {
        self.send(TransportEvent::Ack {
            id,
            args: vec![error],
        })
    }

    /// Push a named message to the client.
    pub fn push(&self, name: impl Into<String>, args: Vec<Value>) -> bool {
        self.send(TransportEvent::Message {
            name: name.into(),
            args,
        })
    }

    /// Close the connection without dropping the remote end.
    pub fn close(&mut self) {
        lock(&self.events).take();
        self.packet_rx.close();
    }
}

impl Drop for RemoteEnd {
    fn drop(&mut self) {
        self.close();
    }
}
