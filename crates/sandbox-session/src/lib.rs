//! Session client for remote sandboxed execution hosts.
//!
//! Provides:
//! - `Session` - Connection lifecycle, authentication and event re-emission
//! - `RemoteCalls` - Request/acknowledgement correlation over a transport
//! - Filesystem operations (`read_file`, `write_file`, `mkdir`, `rm`, `cp`, `ln`)
//! - `Process` - Handle for a spawned remote process

pub mod call;
pub mod config;
pub mod fs;
pub mod process;
pub mod session;

pub use call::RemoteCalls;
pub use config::{Credential, SessionConfig};
pub use fs::{BulkOp, DescriptorShape, ErrorHandler};
pub use process::Process;
pub use session::Session;

pub use sandbox_transport as transport;

pub use sandbox_core::{
    ClientError, Encoding, ExecOptions, RemoteError, SessionEvent, Transport, TransportError,
    TransportEvent,
};
