//! Error types for wire encoding.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding protocol messages.
#[derive(Error, Debug)]
pub enum CodecError {
    /// JSON encoding or decoding failed.
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// CBOR encoding failed.
    #[error("cbor encode error: {0}")]
    CborEncode(String),

    /// CBOR decoding failed.
    #[error("cbor decode error: {0}")]
    CborDecode(String),

    /// The content type does not name a supported wire format.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
}
