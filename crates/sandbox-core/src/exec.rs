//! Options for spawning a remote process.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys backed by typed fields.
const TYPED_KEYS: [&str; 3] = ["cwd", "env", "term"];

/// Options sent with an `exec` request.
///
/// The common options are typed; anything else the sandbox host understands
/// goes in `extra` and is sent through verbatim. The default value
/// serializes to an empty object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecOptions {
    /// Working directory inside the sandbox.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    /// Extra environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Allocate a terminal for the process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<bool>,

    /// Host-specific options.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExecOptions {
    /// Create empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Request a terminal.
    #[must_use]
    pub fn term(mut self, term: bool) -> Self {
        self.term = Some(term);
        self
    }

    /// Get a host-specific option by key.
    ///
    /// Typed options are read from their fields, not from here.
    #[must_use]
    pub fn get_option(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Set an option by key.
    ///
    /// `cwd`, `env` and `term` update the typed field; anything else goes to
    /// the host-specific options.
    ///
    /// # Errors
    /// Returns error if `value` does not fit the typed field for `key`.
    pub fn set_option(&mut self, key: impl Into<String>, value: Value) -> serde_json::Result<()> {
        let key = key.into();
        if !TYPED_KEYS.contains(&key.as_str()) {
            self.extra.insert(key, value);
            return Ok(());
        }

        let mut wire = self.to_value();
        if let Value::Object(map) = &mut wire {
            map.insert(key, value);
        }
        *self = serde_json::from_value(wire)?;
        Ok(())
    }

    /// Wire representation.
    ///
    /// Typed fields win over same-named entries in `extra`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let serialized = if TYPED_KEYS.iter().any(|key| self.extra.contains_key(*key)) {
            let mut clean = self.clone();
            clean.extra.retain(|key, _| !TYPED_KEYS.contains(&key.as_str()));
            serde_json::to_value(clean)
        } else {
            serde_json::to_value(self)
        };
        serialized.unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_is_empty_object() {
        assert_eq!(ExecOptions::default().to_value(), json!({}));
    }

    #[test]
    fn test_builder_and_extra_options() {
        let mut opts = ExecOptions::new().cwd("/home/user").env("LANG", "C").term(true);
        opts.set_option("cols", json!(120)).unwrap();

        assert_eq!(opts.get_option("cols"), Some(&json!(120)));
        assert_eq!(
            opts.to_value(),
            json!({ "cwd": "/home/user", "env": { "LANG": "C" }, "term": true, "cols": 120 })
        );
    }

    #[test]
    fn test_unknown_fields_land_in_extra() {
        let opts: ExecOptions =
            serde_json::from_value(json!({ "cwd": "/tmp", "detached": true })).unwrap();
        assert_eq!(opts.cwd.as_deref(), Some("/tmp"));
        assert_eq!(opts.get_option("detached"), Some(&json!(true)));
    }

    #[test]
    fn test_typed_keys_update_fields() {
        let mut opts = ExecOptions::new().cwd("/home/user");
        opts.set_option("cwd", json!("/tmp")).unwrap();
        opts.set_option("term", json!(true)).unwrap();

        assert_eq!(opts.cwd.as_deref(), Some("/tmp"));
        assert_eq!(opts.term, Some(true));
        assert!(opts.extra.is_empty());
        assert_eq!(opts.to_value(), json!({ "cwd": "/tmp", "term": true }));
    }

    #[test]
    fn test_typed_key_with_wrong_type_is_rejected() {
        let mut opts = ExecOptions::new().cwd("/home/user");
        assert!(opts.set_option("cwd", json!(42)).is_err());
        assert_eq!(opts.cwd.as_deref(), Some("/home/user"));
    }

    #[test]
    fn test_typed_fields_win_over_extra() {
        let mut opts = ExecOptions::new().cwd("/work");
        opts.extra.insert("cwd".into(), json!("/elsewhere"));
        assert_eq!(opts.to_value(), json!({ "cwd": "/work" }));
    }
}
