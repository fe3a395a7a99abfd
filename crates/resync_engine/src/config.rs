//! Configuration for the sync engine.

use crate::error::SyncResult;
use crate::resolver::ConflictStrategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default debounce window between a mutation and the push it triggers.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// Default maximum number of mutations per push.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Which way data flows during sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    /// Only local mutations are pushed.
    PushOnly,
    /// Local mutations are never pushed.
    PullOnly,
    /// Push local mutations and receive server changes.
    #[default]
    Bidirectional,
}

/// Configuration for sync operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Whether sync runs at all.
    pub enabled: bool,
    /// Data flow direction.
    pub direction: SyncDirection,
    /// Conflict resolution strategy.
    pub strategy: ConflictStrategy,
    /// Debounce window in milliseconds.
    pub debounce_ms: u64,
    /// Maximum mutations per push.
    pub batch_size: usize,
}

impl SyncConfig {
    /// Creates a new sync configuration with defaults.
    pub fn new() -> Self {
        Self {
            enabled: true,
            direction: SyncDirection::Bidirectional,
            strategy: ConflictStrategy::LastWriteWins,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Parses a configuration from JSON; missing fields take defaults.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        serde_json::from_str(json).map_err(|e| resync_protocol::CodecError::from(e).into())
    }

    /// Enables or disables sync.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the sync direction.
    pub fn with_direction(mut self, direction: SyncDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the conflict strategy.
    pub fn with_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = debounce.as_millis() as u64;
        self
    }

    /// Sets the batch size. Zero is clamped to one.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Returns the debounce window.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Returns true if local mutations are ever pushed.
    pub fn pushes(&self) -> bool {
        self.enabled && self.direction != SyncDirection::PullOnly
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
