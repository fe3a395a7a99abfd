//! Client mutations.

use crate::record::RecordData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of mutation applied to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Record was created.
    Create,
    /// Record was updated.
    Update,
    /// Record was deleted.
    Delete,
}

impl Operation {
    /// Returns the wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Returns true if a mutation of this kind may omit its base version.
    pub fn allows_missing_base(&self) -> bool {
        matches!(self, Operation::Create)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the application asks the client log to record.
///
/// The logger fills in identity, ordering and timing when the spec is
/// appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationSpec {
    /// Object (table/collection) name.
    pub object_name: String,
    /// Record identifier within the object.
    pub record_id: String,
    /// Mutation kind.
    pub operation: Operation,
    /// Changed fields (absent for deletes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RecordData>,
    /// Version the client believes the record has. `None` only for creates.
    #[serde(default)]
    pub base_version: Option<u64>,
}

impl MutationSpec {
    /// Creates a spec for a new record.
    pub fn create(
        object_name: impl Into<String>,
        record_id: impl Into<String>,
        data: RecordData,
    ) -> Self {
        Self {
            object_name: object_name.into(),
            record_id: record_id.into(),
            operation: Operation::Create,
            data: Some(data),
            base_version: None,
        }
    }

    /// Creates a spec for an update against `base_version`.
    pub fn update(
        object_name: impl Into<String>,
        record_id: impl Into<String>,
        data: RecordData,
        base_version: u64,
    ) -> Self {
        Self {
            object_name: object_name.into(),
            record_id: record_id.into(),
            operation: Operation::Update,
            data: Some(data),
            base_version: Some(base_version),
        }
    }

    /// Creates a spec for a delete against `base_version`.
    pub fn delete(
        object_name: impl Into<String>,
        record_id: impl Into<String>,
        base_version: u64,
    ) -> Self {
        Self {
            object_name: object_name.into(),
            record_id: record_id.into(),
            operation: Operation::Delete,
            data: None,
            base_version: Some(base_version),
        }
    }

    /// Returns true if the base version is consistent with the operation.
    pub fn has_valid_base(&self) -> bool {
        self.base_version.is_some() || self.operation.allows_missing_base()
    }
}

/// A mutation recorded in the client log, awaiting server confirmation.
///
/// Entries are immutable once appended. They leave the log only when the
/// server reports them as applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationLogEntry {
    /// Unique entry identifier.
    pub id: String,
    /// Object (table/collection) name.
    pub object_name: String,
    /// Record identifier within the object.
    pub record_id: String,
    /// Mutation kind.
    pub operation: Operation,
    /// Changed fields (absent for deletes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RecordData>,
    /// Wall-clock time the mutation was recorded.
    pub timestamp: DateTime<Utc>,
    /// Client that produced the mutation.
    pub client_id: String,
    /// Per-client sequence number, strictly increasing.
    pub sequence: u64,
    /// Version the client believed the record had.
    #[serde(default)]
    pub base_version: Option<u64>,
}

impl MutationLogEntry {
    /// Returns the `(object_name, record_id)` pair this entry targets.
    pub fn record_key(&self) -> (&str, &str) {
        (&self.object_name, &self.record_id)
    }

    /// Returns the base version, treating a missing one as zero.
    pub fn base_version_or_zero(&self) -> u64 {
        self.base_version.unwrap_or(0)
    }

    /// Returns the tentative version an optimistic apply would produce.
    pub fn next_version(&self) -> u64 {
        self.base_version_or_zero() + 1
    }
}
