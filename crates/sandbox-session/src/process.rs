//! Process spawn boundary.

use std::sync::Arc;

use futures::StreamExt;
use sandbox_core::{ExecOptions, Transport, TransportError, TransportEvent};
use serde_json::{Value, json};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error};

use crate::Session;

/// Handle for one remote process.
///
/// Construction emits the `exec` request and returns immediately; whether the
/// host accepted it shows up later on the handle, never as a spawn failure.
pub struct Process {
    transport: Arc<dyn Transport>,
    command: String,
    args: Vec<String>,
    options: ExecOptions,
    spawn_error: Option<TransportError>,
}

impl Process {
    /// Request `command` with `args` on the sandbox host.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        command: impl Into<String>,
        args: Vec<String>,
        options: ExecOptions,
    ) -> Self {
        let command = command.into();
        debug!(%command, ?args, "exec");

        let spawn_error = transport
            .emit("exec", vec![json!(command), json!(args), options.to_value()], None)
            .err();
        if let Some(e) = &spawn_error {
            error!(%command, "Failed to send exec request: {e}");
        }

        Self {
            transport,
            command,
            args,
            options,
            spawn_error,
        }
    }

    /// Command being run.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments passed to the command.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Options the process was started with.
    #[must_use]
    pub const fn options(&self) -> &ExecOptions {
        &self.options
    }

    /// Error from sending the `exec` request, if it could not be enqueued.
    #[must_use]
    pub const fn spawn_error(&self) -> Option<&TransportError> {
        self.spawn_error.as_ref()
    }

    /// Named messages pushed by the host from now on, for the stream layer.
    #[must_use]
    pub fn messages(&self) -> futures::stream::BoxStream<'static, (String, Vec<Value>)> {
        BroadcastStream::new(self.transport.subscribe())
            .filter_map(|res| async move {
                match res {
                    Ok(TransportEvent::Message { name, args }) => Some((name, args)),
                    _ => None,
                }
            })
            .boxed()
    }
}

impl Session {
    /// Spawn `command` on the sandbox host.
    ///
    /// Returns at once, even before the session is connected. Missing
    /// arguments default to none and missing options to empty options.
    #[must_use]
    pub fn exec(
        &self,
        command: impl Into<String>,
        args: Option<Vec<String>>,
        options: Option<ExecOptions>,
    ) -> Process {
        Process::new(
            Arc::clone(&self.inner.transport),
            command,
            args.unwrap_or_default(),
            options.unwrap_or_default(),
        )
    }
}
