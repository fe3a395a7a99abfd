//! Inspect command implementation.

use super::{read_payload, Payload};
use resync_protocol::{MutationOutcome, SyncPushRequest, SyncPushResponse, WireFormat};
use std::fmt::Write as _;
use std::path::Path;

/// Runs the inspect command.
pub fn run(
    path: &Path,
    wire: Option<WireFormat>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let (payload, detected) = read_payload(path, wire)?;
    tracing::debug!(kind = payload.kind(), wire = detected.content_type(), "decoded payload");

    match format {
        "json" => println!("{}", payload.to_json_pretty()?),
        _ => print!("{}", render_text(&payload, detected)),
    }
    Ok(())
}

/// Renders a human-readable summary.
pub fn render_text(payload: &Payload, wire: WireFormat) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", payload.kind(), wire.content_type());
    let _ = writeln!(out, "{}", "=".repeat(40));
    match payload {
        Payload::Request(request) => render_request(&mut out, request),
        Payload::Response(response) => render_response(&mut out, response),
    }
    out
}

fn render_request(out: &mut String, request: &SyncPushRequest) {
    let _ = writeln!(out, "Client:          {}", request.client_id);
    let _ = writeln!(
        out,
        "Last checkpoint: {}",
        request.last_checkpoint.as_deref().unwrap_or("(none)")
    );
    let _ = writeln!(out, "Mutations:       {}", request.mutations.len());
    for m in &request.mutations {
        let base = m
            .base_version
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".into());
        let _ = writeln!(
            out,
            "  #{:<4} {:<6} {}/{} base={} id={}",
            m.sequence, m.operation.as_str(), m.object_name, m.record_id, base, m.id
        );
    }
}

fn render_response(out: &mut String, response: &SyncPushResponse) {
    let _ = writeln!(out, "Checkpoint:      {}", response.checkpoint);
    let _ = writeln!(out, "Results:         {}", response.results.len());
    for result in &response.results {
        let detail = match &result.outcome {
            MutationOutcome::Applied {
                server_version,
                resolved_data,
            } => {
                let merged = if resolved_data.is_some() { " (merged)" } else { "" };
                format!("v{server_version}{merged}")
            }
            MutationOutcome::Conflict { conflict, .. } => format!(
                "{}/{} fields={:?}",
                conflict.object_name, conflict.record_id, conflict.conflicting_fields
            ),
            MutationOutcome::Rejected { reason } => {
                reason.clone().unwrap_or_else(|| "no reason given".into())
            }
        };
        let _ = writeln!(
            out,
            "  {:<8} {} {}",
            result.status(),
            result.mutation_id,
            detail
        );
    }
    let _ = writeln!(out, "Server changes:  {}", response.server_changes.len());
    for change in &response.server_changes {
        let _ = writeln!(
            out,
            "  {:<6} {}/{} v{} at {}",
            change.operation.as_str(),
            change.object_name,
            change.record_id,
            change.server_version,
            change.timestamp.to_rfc3339()
        );
    }
}
