//! Session configuration.

use std::{fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Default number of session events buffered per listener.
const EVENT_CAPACITY: usize = 1024;

/// Authentication credential sent on every (re)connect.
#[derive(Clone)]
pub enum Credential {
    /// Sent as-is.
    Static(Value),
    /// Evaluated at each connect.
    Provider(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl Credential {
    /// Wrap a provider function.
    #[must_use]
    pub fn provider<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self::Provider(Arc::new(f))
    }

    /// Value to send in the `auth` message.
    #[must_use]
    pub fn resolve(&self) -> Value {
        match self {
            Self::Static(value) => value.clone(),
            Self::Provider(f) => f(),
        }
    }
}

impl Default for Credential {
    fn default() -> Self {
        Self::Static(Value::Null)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(_) => f.write_str("Credential::Static(..)"),
            Self::Provider(_) => f.write_str("Credential::Provider(..)"),
        }
    }
}

impl From<Value> for Credential {
    fn from(value: Value) -> Self {
        Self::Static(value)
    }
}

impl From<&str> for Credential {
    fn from(token: &str) -> Self {
        Self::Static(Value::String(token.to_string()))
    }
}

impl From<String> for Credential {
    fn from(token: String) -> Self {
        Self::Static(Value::String(token))
    }
}

impl<'de> Deserialize<'de> for Credential {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::Static)
    }
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Credential sent in the `auth` message.
    #[serde(rename = "auth")]
    pub credential: Credential,
    /// Upper bound on waiting for an acknowledgement, in milliseconds.
    /// Unset means calls wait until the remote host answers.
    pub call_timeout_ms: Option<u64>,
    /// Session events buffered per listener.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credential: Credential::default(),
            call_timeout_ms: None,
            event_capacity: EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Create a default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the credential.
    #[must_use]
    pub fn credential(mut self, credential: impl Into<Credential>) -> Self {
        self.credential = credential.into();
        self
    }

    /// Bound how long a call waits for its acknowledgement.
    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Configured call timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}
