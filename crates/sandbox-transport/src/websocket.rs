//! WebSocket transport with reconnection.

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use sandbox_core::{AckId, Transport, TransportError, TransportEvent};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::{
    outlet::EventOutlet,
    protocol::{Frame, Packet},
};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// WebSocket transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Endpoint URL (`ws://` or `wss://`).
    pub url: String,
    /// Delay between reconnection attempts, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Give up after this many consecutive failed attempts.
    pub max_reconnect_attempts: Option<u32>,
    /// Transport events buffered per subscriber.
    pub event_capacity: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000/ws".to_string(),
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: None,
            event_capacity: 10_000,
        }
    }
}

impl WebSocketConfig {
    /// Create a config for `url` with default reconnection settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the reconnection delay.
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Limit consecutive failed attempts.
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    const fn delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Transport over a single WebSocket connection to the sandbox host.
///
/// Connecting happens in a background task; messages emitted while
/// disconnected are buffered and flushed once a connection is up.
pub struct WebSocketTransport {
    packet_tx: mpsc::UnboundedSender<Packet>,
    events: broadcast::Sender<TransportEvent>,
    control: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    task: JoinHandle<()>,
}

impl WebSocketTransport {
    /// Start connecting to the configured endpoint.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn connect(config: WebSocketConfig) -> Self {
        let (packet_tx, packet_rx) = mpsc::unbounded_channel();
        // The control queue exists before the loop can publish anything.
        let (outlet, control) = EventOutlet::new(config.event_capacity);
        let events = outlet.broadcaster();

        let task = tokio::spawn(async move {
            connection_loop(config, packet_rx, outlet).await;
        });

        Self {
            packet_tx,
            events,
            control: Mutex::new(Some(control)),
            task,
        }
    }
}

impl Transport for WebSocketTransport {
    fn emit(&self, event: &str, args: Vec<Value>, ack: Option<AckId>) -> Result<(), TransportError> {
        self.packet_tx
            .send(Packet::new(event, args, ack))
            .map_err(|_| TransportError::Closed)
    }

    fn take_control(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Why a live connection ended.
enum Ended {
    /// The transport was dropped.
    Shutdown,
    /// The connection was lost.
    Lost(String),
}

/// Connection loop with reconnection logic
async fn connection_loop(
    config: WebSocketConfig,
    mut packet_rx: mpsc::UnboundedReceiver<Packet>,
    events: EventOutlet,
) {
    let mut connected_before = false;
    let mut attempt: u32 = 0;

    loop {
        info!(url = %config.url, attempt, "Connecting to sandbox host");

        match connect_async(config.url.as_str()).await {
            Ok((ws, _)) => {
                if connected_before {
                    events.send(TransportEvent::Reconnect { attempt });
                }
                connected_before = true;
                attempt = 0;

                info!(url = %config.url, "Connected to sandbox host");
                events.send(TransportEvent::Connect);

                match run_connection(ws, &mut packet_rx, &events).await {
                    Ended::Shutdown => {
                        debug!("Transport dropped, closing connection");
                        return;
                    }
                    Ended::Lost(reason) => {
                        warn!(%reason, "Connection to sandbox host lost");
                        events.send(TransportEvent::Disconnect { reason });
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to sandbox host");
                events.send(TransportEvent::Error(json!({
                    "message": e.to_string(),
                    "code": "ECONNECT",
                })));
            }
        }

        attempt = attempt.saturating_add(1);
        if config.max_reconnect_attempts.is_some_and(|max| attempt > max) {
            error!(attempts = attempt - 1, "Giving up on sandbox host");
            events.send(TransportEvent::Fatal(json!({
                "message": "Reconnection attempts exhausted",
                "attempts": attempt - 1,
            })));
            return;
        }

        debug!(delay = ?config.delay(), "Reconnecting to sandbox host...");
        tokio::time::sleep(config.delay()).await;
    }
}

async fn run_connection(
    ws: WsStream,
    packet_rx: &mut mpsc::UnboundedReceiver<Packet>,
    events: &EventOutlet,
) -> Ended {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            packet = packet_rx.recv() => {
                let Some(packet) = packet else {
                    let _ = sink.close().await;
                    return Ended::Shutdown;
                };

                let name = packet.name.clone();
                let json = match Frame::from(packet).to_json() {
                    Ok(j) => j,
                    Err(e) => {
                        error!(event = %name, "Failed to serialize message: {e}");
                        continue;
                    }
                };
                debug!(event = %name, "-> sandbox host");
                if let Err(e) = sink.send(Message::Text(json)).await {
                    return Ended::Lost(e.to_string());
                }
            }
            msg = stream.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(s) => s,
                        Err(_) => continue,
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.into_owned())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "server closed connection".to_string());
                        return Ended::Lost(reason);
                    }
                    // Ping/pong is handled by tungstenite
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Ended::Lost(e.to_string()),
                    None => return Ended::Lost("connection closed".to_string()),
                };

                match Frame::from_json(&text) {
                    Ok(frame) => {
                        events.send(frame.into_event());
                    }
                    Err(e) => warn!("Invalid frame from sandbox host: {e}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_builders() {
        let config = WebSocketConfig::new("ws://sandbox:8080/ws")
            .reconnect_delay(Duration::from_millis(250))
            .max_reconnect_attempts(5);

        assert_eq!(config.url, "ws://sandbox:8080/ws");
        assert_eq!(config.delay(), Duration::from_millis(250));
        assert_eq!(config.max_reconnect_attempts, Some(5));
        assert_eq!(config.event_capacity, 10_000);
    }

    #[test]
    fn test_config_from_json() {
        let config: WebSocketConfig =
            serde_json::from_str(r#"{"url":"ws://box/ws","max_reconnect_attempts":2}"#).unwrap();
        assert_eq!(config.url, "ws://box/ws");
        assert_eq!(config.reconnect_delay_ms, 1000);
        assert_eq!(config.max_reconnect_attempts, Some(2));
    }

    #[tokio::test]
    async fn test_unreachable_host_gives_up() {
        let transport = WebSocketTransport::connect(
            WebSocketConfig::new("ws://127.0.0.1:1/ws")
                .reconnect_delay(Duration::from_millis(1))
                .max_reconnect_attempts(1),
        );
        let mut control = transport.take_control().unwrap();

        let mut saw_error = false;
        let mut saw_fatal = false;
        while let Some(event) = control.recv().await {
            match event {
                TransportEvent::Error(payload) => {
                    assert_eq!(payload["code"], json!("ECONNECT"));
                    saw_error = true;
                }
                TransportEvent::Fatal(payload) => {
                    assert_eq!(payload["attempts"], json!(1));
                    saw_fatal = true;
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
        // The queue ends once the connection loop gives up.
        assert!(saw_error);
        assert!(saw_fatal);
        assert_eq!(
            transport.emit("readFile", vec![], Some(1)),
            Err(TransportError::Closed)
        );
    }
}
