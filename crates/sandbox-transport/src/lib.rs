//! Wire protocol and transports for remote sandbox sessions.
//!
//! Provides:
//! - Wire protocol (JSON frames + base64 binary buffers)
//! - Event fan-out: lossless control queue plus broadcast
//! - In-process channel transport with a scriptable remote end
//! - WebSocket transport with reconnection (feature: websocket)

pub mod channel;
pub mod outlet;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use channel::{ChannelTransport, RemoteEnd};
pub use outlet::EventOutlet;
pub use protocol::{Frame, Packet, ProtocolError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketTransport};
