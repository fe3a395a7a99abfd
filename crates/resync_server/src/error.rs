//! Error types for the sync server.

use resync_protocol::CodecError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
///
/// These reject a request as a whole. Per-mutation failures are reported
/// as `rejected` results inside the response instead.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format or size.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The sync endpoint is switched off.
    #[error("sync endpoint disabled")]
    Disabled,

    /// No endpoint is mounted at the requested path.
    #[error("no sync endpoint at {0}")]
    NotFound(String),

    /// The embedding application's record resolver failed.
    #[error("record resolver error: {0}")]
    Resolver(String),

    /// Wire encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::Disabled
                | ServerError::NotFound(_)
                | ServerError::Codec(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Resolver(_))
    }
}
