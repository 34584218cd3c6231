//! Core abstractions for remote sandbox sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `Transport` - Named-message transport trait and its events
//! - `RemoteError` / `ClientError` - Typed error taxonomy
//! - `EventHub` - Broadcast of session lifecycle events
//! - `Encoding` - Text encodings for file content
//! - `ExecOptions` - Options handed to a spawned remote process

pub mod encoding;
pub mod error;
pub mod events;
pub mod exec;
pub mod traits;

pub use encoding::Encoding;
pub use error::{ClientError, RemoteError, TransportError};
pub use events::{EventHub, SessionEvent};
pub use exec::ExecOptions;
pub use traits::{AckId, Transport, TransportEvent};
