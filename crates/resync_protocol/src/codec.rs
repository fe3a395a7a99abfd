//! Wire codecs.
//!
//! JSON is the default wire format. CBOR is offered for clients that
//! prefer a compact binary body; both carry the same serde data model.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Supported wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// `application/json`.
    #[default]
    Json,
    /// `application/cbor`.
    Cbor,
}

impl WireFormat {
    /// Returns the MIME content type for this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            WireFormat::Json => "application/json",
            WireFormat::Cbor => "application/cbor",
        }
    }

    /// Resolves a format from a content type header value.
    ///
    /// Parameters such as `; charset=utf-8` are ignored.
    pub fn from_content_type(content_type: &str) -> CodecResult<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "application/json" => Ok(WireFormat::Json),
            "application/cbor" => Ok(WireFormat::Cbor),
            _ => Err(CodecError::UnsupportedContentType(content_type.to_string())),
        }
    }

    /// Encodes a value.
    pub fn encode<T: Serialize>(&self, value: &T) -> CodecResult<Vec<u8>> {
        match self {
            WireFormat::Json => Ok(serde_json::to_vec(value)?),
            WireFormat::Cbor => {
                let mut buf = Vec::new();
                ciborium::into_writer(value, &mut buf)
                    .map_err(|e| CodecError::CborEncode(e.to_string()))?;
                Ok(buf)
            }
        }
    }

    /// Decodes a value.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        match self {
            WireFormat::Json => Ok(serde_json::from_slice(bytes)?),
            WireFormat::Cbor => {
                ciborium::from_reader(bytes).map_err(|e| CodecError::CborDecode(e.to_string()))
            }
        }
    }
}
