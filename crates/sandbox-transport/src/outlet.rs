//! Event fan-out shared by the transports.

use sandbox_core::TransportEvent;
use tokio::sync::{broadcast, mpsc};

/// Publishing side of a transport's events.
///
/// Control events (lifecycle signals and acks) go to an unbounded queue read
/// by the session; every event, named messages included, goes to a bounded
/// broadcast for observers.
#[derive(Debug, Clone)]
pub struct EventOutlet {
    control: mpsc::UnboundedSender<TransportEvent>,
    broadcast: broadcast::Sender<TransportEvent>,
}

impl EventOutlet {
    /// Create an outlet and its control queue.
    ///
    /// `capacity` bounds each broadcast subscriber's backlog.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (control, control_rx) = mpsc::unbounded_channel();
        let (broadcast, _) = broadcast::channel(capacity.max(1));
        (Self { control, broadcast }, control_rx)
    }

    /// Publish an event.
    ///
    /// Returns `false` if it reached nobody.
    pub fn send(&self, event: TransportEvent) -> bool {
        let queued = event.is_control() && self.control.send(event.clone()).is_ok();
        let broadcast = self.broadcast.send(event).is_ok();
        queued || broadcast
    }

    /// Subscribe to the broadcast side.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.broadcast.subscribe()
    }

    /// Handle for subscribing without keeping the control queue open.
    #[must_use]
    pub fn broadcaster(&self) -> broadcast::Sender<TransportEvent> {
        self.broadcast.clone()
    }
}
