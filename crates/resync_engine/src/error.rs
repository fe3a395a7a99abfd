//! Error types for the sync engine.

use resync_protocol::CodecError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Protocol error (unexpected message shape).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Wire encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Server rejected the request as a whole.
    #[error("server error: {0}")]
    ServerError(String),

    /// A mutation spec violates the log's invariants.
    #[error("invalid mutation: {0}")]
    InvalidMutation(String),

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,
}

impl SyncError {
    /// Returns true if this error can be retried.
    ///
    /// The pending log is left untouched by a failed push, so a retry
    /// resends the same batch.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_) | SyncError::NotConnected | SyncError::ServerError(_)
        )
    }
}
