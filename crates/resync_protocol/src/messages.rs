//! Protocol messages for sync.

use crate::codec::WireFormat;
use crate::error::CodecResult;
use crate::mutation::{MutationLogEntry, Operation};
use crate::record::RecordData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque change-log cursor.
///
/// Clients store and echo it back; only the server interprets it.
pub type Checkpoint = String;

/// Checkpoint reported by a server whose change log has never recorded
/// anything.
pub const EMPTY_CHECKPOINT: &str = "0";

/// Default HTTP path of the push endpoint.
pub const DEFAULT_SYNC_PATH: &str = "/api/sync/push";

/// Push request from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPushRequest {
    /// Client pushing the mutations.
    pub client_id: String,
    /// Mutations in client log order.
    pub mutations: Vec<MutationLogEntry>,
    /// Last checkpoint the client has seen (`None` = from the beginning).
    #[serde(default)]
    pub last_checkpoint: Option<Checkpoint>,
}

impl SyncPushRequest {
    /// Creates a new push request.
    pub fn new(
        client_id: impl Into<String>,
        mutations: Vec<MutationLogEntry>,
        last_checkpoint: Option<Checkpoint>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            mutations,
            last_checkpoint,
        }
    }

    /// Encodes the request in the given wire format.
    pub fn encode(&self, format: WireFormat) -> CodecResult<Vec<u8>> {
        format.encode(self)
    }

    /// Decodes a request from the given wire format.
    pub fn decode(bytes: &[u8], format: WireFormat) -> CodecResult<Self> {
        format.decode(bytes)
    }
}

/// A conflict detected by the server for one mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    /// Object name.
    pub object_name: String,
    /// Record identifier.
    pub record_id: String,
    /// The mutation that conflicted.
    pub client_mutation: MutationLogEntry,
    /// The server's current record (empty if none exists).
    pub server_record: RecordData,
    /// Configured fields whose client and server values differ.
    #[serde(default)]
    pub conflicting_fields: Vec<String>,
}

impl SyncConflict {
    /// Creates a conflict for `client_mutation`.
    pub fn new(
        client_mutation: MutationLogEntry,
        server_record: RecordData,
        conflicting_fields: Vec<String>,
    ) -> Self {
        Self {
            object_name: client_mutation.object_name.clone(),
            record_id: client_mutation.record_id.clone(),
            client_mutation,
            server_record,
            conflicting_fields,
        }
    }
}

/// Outcome of a single mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum MutationOutcome {
    /// The mutation took effect.
    Applied {
        /// Version assigned to the record.
        server_version: u64,
        /// Data produced by a client-side resolver merge.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resolved_data: Option<RecordData>,
    },
    /// The mutation's base version did not match.
    Conflict {
        /// Details of the conflict.
        conflict: SyncConflict,
        /// Data a resolver proposes in place of the client's.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suggested_resolution: Option<RecordData>,
    },
    /// The record resolver refused the mutation.
    Rejected {
        /// Why the mutation was rejected.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// Result for one mutation of a push request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMutationResult {
    /// Id of the mutation this result refers to.
    pub mutation_id: String,
    /// What happened to it.
    #[serde(flatten)]
    pub outcome: MutationOutcome,
}

impl SyncMutationResult {
    /// Creates an applied result.
    pub fn applied(mutation_id: impl Into<String>, server_version: u64) -> Self {
        Self {
            mutation_id: mutation_id.into(),
            outcome: MutationOutcome::Applied {
                server_version,
                resolved_data: None,
            },
        }
    }

    /// Creates an applied result carrying resolver-merged data.
    pub fn applied_with(
        mutation_id: impl Into<String>,
        server_version: u64,
        resolved_data: RecordData,
    ) -> Self {
        Self {
            mutation_id: mutation_id.into(),
            outcome: MutationOutcome::Applied {
                server_version,
                resolved_data: Some(resolved_data),
            },
        }
    }

    /// Creates a conflict result.
    pub fn conflict(conflict: SyncConflict) -> Self {
        Self {
            mutation_id: conflict.client_mutation.id.clone(),
            outcome: MutationOutcome::Conflict {
                conflict,
                suggested_resolution: None,
            },
        }
    }

    /// Creates a conflict result with a suggested resolution.
    pub fn conflict_with_suggestion(conflict: SyncConflict, suggestion: RecordData) -> Self {
        Self {
            mutation_id: conflict.client_mutation.id.clone(),
            outcome: MutationOutcome::Conflict {
                conflict,
                suggested_resolution: Some(suggestion),
            },
        }
    }

    /// Creates a rejected result.
    pub fn rejected(mutation_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            mutation_id: mutation_id.into(),
            outcome: MutationOutcome::Rejected {
                reason: Some(reason.into()),
            },
        }
    }

    /// Returns the wire status name.
    pub fn status(&self) -> &'static str {
        match self.outcome {
            MutationOutcome::Applied { .. } => "applied",
            MutationOutcome::Conflict { .. } => "conflict",
            MutationOutcome::Rejected { .. } => "rejected",
        }
    }

    /// Returns true if the mutation was applied.
    pub fn is_applied(&self) -> bool {
        matches!(self.outcome, MutationOutcome::Applied { .. })
    }

    /// Returns the assigned version, present iff applied.
    pub fn server_version(&self) -> Option<u64> {
        match self.outcome {
            MutationOutcome::Applied { server_version, .. } => Some(server_version),
            _ => None,
        }
    }

    /// Returns the conflict, present iff the status is conflict.
    pub fn conflict_details(&self) -> Option<&SyncConflict> {
        match &self.outcome {
            MutationOutcome::Conflict { conflict, .. } => Some(conflict),
            _ => None,
        }
    }
}

/// A change the server accepted, as seen by other clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncServerChange {
    /// Object name.
    pub object_name: String,
    /// Record identifier.
    pub record_id: String,
    /// Mutation kind.
    pub operation: Operation,
    /// Data carried by the accepted mutation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RecordData>,
    /// Version assigned by the server.
    pub server_version: u64,
    /// When the server recorded the change.
    pub timestamp: DateTime<Utc>,
}

/// Push response from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPushResponse {
    /// One result per pushed mutation, in request order.
    pub results: Vec<SyncMutationResult>,
    /// Changes newer than the request's checkpoint.
    #[serde(default)]
    pub server_changes: Vec<SyncServerChange>,
    /// Checkpoint the client should store.
    pub checkpoint: Checkpoint,
}

impl SyncPushResponse {
    /// Creates a new push response.
    pub fn new(
        results: Vec<SyncMutationResult>,
        server_changes: Vec<SyncServerChange>,
        checkpoint: impl Into<Checkpoint>,
    ) -> Self {
        Self {
            results,
            server_changes,
            checkpoint: checkpoint.into(),
        }
    }

    /// Returns the ids of applied mutations.
    pub fn applied_ids(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.is_applied())
            .map(|r| r.mutation_id.as_str())
            .collect()
    }

    /// Returns all reported conflicts.
    pub fn conflicts(&self) -> Vec<&SyncConflict> {
        self.results
            .iter()
            .filter_map(|r| r.conflict_details())
            .collect()
    }

    /// Encodes the response in the given wire format.
    pub fn encode(&self, format: WireFormat) -> CodecResult<Vec<u8>> {
        format.encode(self)
    }

    /// Decodes a response from the given wire format.
    pub fn decode(bytes: &[u8], format: WireFormat) -> CodecResult<Self> {
        format.decode(bytes)
    }
}
