//! Convert command implementation.

use super::{read_payload, CliError};
use resync_protocol::WireFormat;
use serde::Serialize;
use std::path::Path;

/// Outcome of a conversion.
#[derive(Debug, Serialize)]
pub struct ConvertSummary {
    /// Payload kind.
    pub kind: &'static str,
    /// Source content type.
    pub from: &'static str,
    /// Target content type.
    pub to: &'static str,
    /// Bytes read.
    pub input_bytes: u64,
    /// Bytes written.
    pub output_bytes: usize,
}

/// Re-encodes a payload file in another wire format.
pub fn convert(
    input: &Path,
    output: &Path,
    from: Option<WireFormat>,
    to: WireFormat,
) -> Result<ConvertSummary, CliError> {
    let (payload, detected) = read_payload(input, from)?;
    let encoded = payload.encode(to)?;
    std::fs::write(output, &encoded).map_err(|source| CliError::Io {
        path: output.display().to_string(),
        source,
    })?;

    let input_bytes = std::fs::metadata(input).map(|m| m.len()).unwrap_or(0);
    Ok(ConvertSummary {
        kind: payload.kind(),
        from: detected.content_type(),
        to: to.content_type(),
        input_bytes,
        output_bytes: encoded.len(),
    })
}

/// Runs the convert command.
pub fn run(
    input: &Path,
    output: &Path,
    from: Option<WireFormat>,
    to: WireFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let summary = convert(input, output, from, to)?;
    println!(
        "Converted {} from {} ({} bytes) to {} ({} bytes): {}",
        summary.kind,
        summary.from,
        summary.input_bytes,
        summary.to,
        summary.output_bytes,
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Payload;
    use resync_protocol::{MutationLogEntry, Operation, SyncPushRequest};

    fn request() -> SyncPushRequest {
        let entry = MutationLogEntry {
            id: "6f1c".into(),
            object_name: "todo".into(),
            record_id: "r1".into(),
            operation: Operation::Update,
            data: serde_json::json!({"title": "milk"}).as_object().cloned(),
            timestamp: "2024-05-01T10:00:00Z".parse().unwrap(),
            client_id: "c1".into(),
            sequence: 9,
            base_version: Some(2),
        };
        SyncPushRequest::new("c1", vec![entry], Some("40".into()))
    }

    #[test]
    fn json_to_cbor_and_back() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("push.json");
        let cbor_path = dir.path().join("push.cbor");
        let back_path = dir.path().join("back.json");
        std::fs::write(&json_path, request().encode(WireFormat::Json).unwrap()).unwrap();

        let summary = convert(&json_path, &cbor_path, None, WireFormat::Cbor).unwrap();
        assert_eq!(summary.kind, "push request");
        assert_eq!(summary.from, "application/json");
        assert!(summary.output_bytes > 0);

        convert(&cbor_path, &back_path, None, WireFormat::Json).unwrap();
        let (payload, format) = read_payload(&back_path, None).unwrap();
        assert_eq!(format, WireFormat::Json);
        assert_eq!(payload, Payload::Request(request()));
    }

    #[test]
    fn missing_input_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = convert(
            &dir.path().join("absent.json"),
            &dir.path().join("out.cbor"),
            None,
            WireFormat::Cbor,
        )
        .unwrap_err();
        assert!(matches!(err, CliError::Io { .. }));
    }
}
