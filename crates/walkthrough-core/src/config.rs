//! Session configuration threaded through a walkthrough run.

use crate::error::ConfigUpdateError;
use crate::path;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Auth material and endpoint parameters for one run.
///
/// A run starts from one `Config` and replaces it with whatever each step's
/// updater returns. The helpers here all merge; none of them drop keys they
/// were not asked to touch.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use walkthrough_core::Config;
///
/// let config = Config::new()
///     .with_param("api_key", "X")
///     .with_auth("bearerAuth.AccessToken", "token-1");
///
/// assert_eq!(config.param("api_key"), Some(&json!("X")));
/// assert_eq!(
///     config.auth_value("bearerAuth.AccessToken"),
///     Some(&json!("token-1"))
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Credential material, e.g. `bearerAuth.AccessToken`.
    #[serde(default)]
    pub auth: Map<String, Value>,
    /// Arbitrary endpoint parameters.
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl Config {
    /// Creates an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an auth field at a dotted path.
    pub fn with_auth(mut self, path: &str, value: impl Into<Value>) -> Self {
        path::set_in(&mut self.auth, path, value.into());
        self
    }

    /// Sets an endpoint parameter at a dotted path.
    pub fn with_param(mut self, path: &str, value: impl Into<Value>) -> Self {
        path::set_in(&mut self.config, path, value.into());
        self
    }

    /// Deep-merges another config on top of this one.
    pub fn merge(mut self, patch: Config) -> Self {
        path::merge_maps(&mut self.auth, patch.auth);
        path::merge_maps(&mut self.config, patch.config);
        self
    }

    /// Returns the auth field at a dotted path, if present.
    pub fn auth_value(&self, path: &str) -> Option<&Value> {
        path::lookup_in(&self.auth, path)
    }

    /// Returns the endpoint parameter at a dotted path, if present.
    pub fn param(&self, path: &str) -> Option<&Value> {
        path::lookup_in(&self.config, path)
    }

    /// Like [`auth_value`](Self::auth_value), but absence is an error.
    ///
    /// Updaters use this when they depend on a nested field that an earlier
    /// step should have set.
    pub fn require_auth(&self, path: &str) -> Result<&Value, ConfigUpdateError> {
        self.auth_value(path)
            .ok_or_else(|| ConfigUpdateError::MissingField(format!("auth.{path}")))
    }

    /// Like [`param`](Self::param), but absence is an error.
    pub fn require_param(&self, path: &str) -> Result<&Value, ConfigUpdateError> {
        self.param(path)
            .ok_or_else(|| ConfigUpdateError::MissingField(format!("config.{path}")))
    }

    /// Returns the config as a single JSON object with `auth` and `config` keys.
    pub fn to_value(&self) -> Value {
        let mut root = Map::new();
        root.insert("auth".to_string(), Value::Object(self.auth.clone()));
        root.insert("config".to_string(), Value::Object(self.config.clone()));
        Value::Object(root)
    }
}
