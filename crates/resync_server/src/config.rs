//! Server configuration.

use resync_protocol::DEFAULT_SYNC_PATH;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default cap on mutations accepted in one push.
pub const DEFAULT_MAX_MUTATIONS_PER_REQUEST: usize = 100;

/// Default change log retention.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Configuration of the push endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncEndpointConfig {
    /// Whether the endpoint accepts pushes.
    pub enabled: bool,
    /// Path the endpoint is mounted at.
    pub path: String,
    /// Maximum mutations per request; larger requests are refused whole.
    pub max_mutations_per_request: usize,
    /// How long accepted changes stay in the change log.
    pub change_log_retention_days: u32,
}

impl SyncEndpointConfig {
    /// Creates an endpoint configuration with defaults.
    pub fn new() -> Self {
        Self {
            enabled: true,
            path: DEFAULT_SYNC_PATH.to_string(),
            max_mutations_per_request: DEFAULT_MAX_MUTATIONS_PER_REQUEST,
            change_log_retention_days: DEFAULT_RETENTION_DAYS,
        }
    }

    /// Enables or disables the endpoint.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the mount path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the maximum mutations per request.
    pub fn with_max_mutations_per_request(mut self, max: usize) -> Self {
        self.max_mutations_per_request = max;
        self
    }

    /// Sets the change log retention in days.
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.change_log_retention_days = days;
        self
    }

    /// Returns the retention window.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.change_log_retention_days) * 24 * 60 * 60)
    }
}

impl Default for SyncEndpointConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the sync server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Push endpoint settings.
    pub endpoint: SyncEndpointConfig,
    /// Per object name, the fields compared when reporting a conflict.
    pub conflict_fields: HashMap<String, Vec<String>>,
}

impl ServerConfig {
    /// Creates a server configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the endpoint configuration.
    pub fn with_endpoint(mut self, endpoint: SyncEndpointConfig) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Declares the conflict fields of an object type.
    pub fn with_conflict_fields<I, S>(mut self, object_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conflict_fields
            .insert(object_name.into(), fields.into_iter().map(Into::into).collect());
        self
    }

    /// Returns the conflict fields of an object type (empty if undeclared).
    pub fn conflict_fields_for(&self, object_name: &str) -> &[String] {
        self.conflict_fields
            .get(object_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
