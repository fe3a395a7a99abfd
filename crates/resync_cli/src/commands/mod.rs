//! CLI command implementations.

pub mod convert;
pub mod inspect;
pub mod simulate;

use resync_protocol::{CodecError, CodecResult, SyncPushRequest, SyncPushResponse, WireFormat};
use std::path::Path;
use thiserror::Error;

/// Errors reported by the CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The `--wire` argument names no known format.
    #[error("unknown wire format: {0} (expected json, cbor or auto)")]
    UnknownFormat(String),

    /// The payload decodes as neither message.
    #[error("{0} is neither a push request nor a push response")]
    UnknownPayload(String),

    /// Reading or writing a file failed.
    #[error("cannot access {path}: {source}")]
    Io {
        /// File involved.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Encoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A decoded wire payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Client to server.
    Request(SyncPushRequest),
    /// Server to client.
    Response(SyncPushResponse),
}

impl Payload {
    /// Returns a short name for the payload kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Request(_) => "push request",
            Payload::Response(_) => "push response",
        }
    }

    /// Encodes the payload.
    pub fn encode(&self, format: WireFormat) -> CodecResult<Vec<u8>> {
        match self {
            Payload::Request(r) => r.encode(format),
            Payload::Response(r) => r.encode(format),
        }
    }

    /// Renders the payload as pretty JSON.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        match self {
            Payload::Request(r) => serde_json::to_string_pretty(r),
            Payload::Response(r) => serde_json::to_string_pretty(r),
        }
    }

    /// Decodes bytes as a request, falling back to a response.
    pub fn decode(bytes: &[u8], format: WireFormat) -> Option<Self> {
        if let Ok(request) = SyncPushRequest::decode(bytes, format) {
            return Some(Payload::Request(request));
        }
        SyncPushResponse::decode(bytes, format)
            .ok()
            .map(Payload::Response)
    }
}

/// Parses a `--wire` argument; `None` means detect from content.
pub fn parse_format(name: &str) -> Result<Option<WireFormat>, CliError> {
    match name.to_ascii_lowercase().as_str() {
        "auto" => Ok(None),
        "json" => Ok(Some(WireFormat::Json)),
        "cbor" => Ok(Some(WireFormat::Cbor)),
        other => Err(CliError::UnknownFormat(other.to_string())),
    }
}

/// Guesses the wire format: JSON documents start with `{`.
pub fn sniff_format(bytes: &[u8]) -> WireFormat {
    match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') => WireFormat::Json,
        _ => WireFormat::Cbor,
    }
}

/// Reads and decodes a payload file.
pub fn read_payload(
    path: &Path,
    format: Option<WireFormat>,
) -> Result<(Payload, WireFormat), CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let format = format.unwrap_or_else(|| sniff_format(&bytes));
    let payload = Payload::decode(&bytes, format)
        .ok_or_else(|| CliError::UnknownPayload(path.display().to_string()))?;
    Ok((payload, format))
}
