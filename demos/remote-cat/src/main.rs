//! Print a file from a remote sandbox.
//!
//! Run with: cargo run -p remote-cat -- ws://localhost:3000/ws /etc/hostname [encoding]
//!
//! The credential is read from `SANDBOX_TOKEN`.

use std::time::Duration;

use anyhow::{Context, bail};
use futures::StreamExt;
use sandbox_session::{
    Encoding, Session, SessionConfig, SessionEvent, transport::WebSocketConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(url), Some(path)) = (args.next(), args.next()) else {
        bail!("usage: remote-cat <url> <path> [encoding]");
    };
    let encoding: Encoding = match args.next() {
        Some(name) => name.parse()?,
        None => Encoding::Utf8,
    };

    let mut config = SessionConfig::new().call_timeout(Duration::from_secs(30));
    if let Ok(token) = std::env::var("SANDBOX_TOKEN") {
        config = config.credential(token);
    }

    let transport = WebSocketConfig::new(url)
        .reconnect_delay(Duration::from_millis(500))
        .max_reconnect_attempts(5);
    let session = Session::connect(transport, config);
    let mut events = session.events();

    tokio::time::timeout(CONNECT_TIMEOUT, async {
        if session.is_connected() {
            return Ok(());
        }
        while let Some(event) = events.next().await {
            match event {
                SessionEvent::Connect => return Ok(()),
                SessionEvent::Error(e) => tracing::warn!("Connection error: {e}"),
                other => tracing::debug!(event = other.name(), "waiting for connect"),
            }
        }
        bail!("session closed before connecting")
    })
    .await
    .context("timed out connecting to sandbox host")??;

    let contents = session
        .read_file_with(&path, encoding)
        .await
        .with_context(|| format!("failed to read {path}"))?;
    print!("{contents}");

    Ok(())
}
