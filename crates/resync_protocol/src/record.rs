//! Helpers over application record data.
//!
//! Records travel as JSON objects. The protocol never interprets their
//! schema beyond a handful of well-known conventions:
//!
//! - `updated_at` carries the server's last-write time (RFC 3339 string or
//!   Unix milliseconds), used by last-write-wins resolution.
//! - Conflicting fields are compared by JSON value equality.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::time::UNIX_EPOCH;

/// Field map of an application record.
pub type RecordData = Map<String, Value>;

/// Field holding a record's last-write time.
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Returns the record's `updated_at` time.
///
/// A missing or unparseable value reads as the Unix epoch, so any client
/// write compares as newer.
pub fn updated_at(record: &RecordData) -> DateTime<Utc> {
    record
        .get(UPDATED_AT_FIELD)
        .and_then(parse_timestamp)
        .unwrap_or_else(epoch)
}

/// Returns the Unix epoch as a UTC timestamp.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from(UNIX_EPOCH)
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

/// Returns the configured fields whose client value differs from the server.
///
/// Only fields the client actually sent are considered; a field absent from
/// the server record compares as `null`. Order follows `fields`.
pub fn conflicting_fields(
    fields: &[String],
    client: Option<&RecordData>,
    server: &RecordData,
) -> Vec<String> {
    let Some(client) = client else {
        return Vec::new();
    };

    fields
        .iter()
        .filter(|field| match client.get(field.as_str()) {
            Some(ours) => ours != server.get(field.as_str()).unwrap_or(&Value::Null),
            None => false,
        })
        .cloned()
        .collect()
}

/// Merges client fields over the server record, except `keep_server`.
///
/// Fields named in `keep_server` always retain the server's value, even
/// when the client changed them.
pub fn merge_keeping_server(
    server: &RecordData,
    client: Option<&RecordData>,
    keep_server: &[String],
) -> RecordData {
    let mut merged = server.clone();
    if let Some(client) = client {
        for (field, value) in client {
            if keep_server.iter().any(|f| f == field) {
                continue;
            }
            merged.insert(field.clone(), value.clone());
        }
    }
    merged
}
