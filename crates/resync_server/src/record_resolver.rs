//! Boundary to the embedding application's record storage.

use crate::error::{ServerError, ServerResult};
use async_trait::async_trait;
use chrono::SecondsFormat;
use parking_lot::RwLock;
use resync_protocol::record::{RecordData, UPDATED_AT_FIELD};
use resync_protocol::{MutationLogEntry, Operation};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Access to the authoritative records, supplied by the application.
///
/// # Contract
///
/// `apply_mutation` must persist the mutation atomically with the version
/// the server just assigned, and must be idempotent for repeated delivery
/// of the same mutation id (clients resend until they see `applied`).
#[async_trait]
pub trait RecordResolver: Send + Sync {
    /// Returns the current record, or an empty map if it does not exist.
    async fn get_record(&self, object_name: &str, record_id: &str) -> ServerResult<RecordData>;

    /// Persists an accepted mutation under `new_version`.
    async fn apply_mutation(&self, mutation: &MutationLogEntry, new_version: u64)
        -> ServerResult<()>;
}

#[derive(Debug, Clone)]
struct StoredRecord {
    data: RecordData,
    version: u64,
}

/// In-memory record storage for tests and demos.
///
/// Updates merge the mutation's fields into the stored record. The
/// `updated_at` field is stamped from the mutation timestamp unless the
/// mutation supplies it.
#[derive(Debug, Default)]
pub struct MemoryRecordResolver {
    records: RwLock<HashMap<(String, String), StoredRecord>>,
    applied: RwLock<HashSet<String>>,
    failing_objects: RwLock<HashSet<String>>,
}

impl MemoryRecordResolver {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record directly, bypassing the sync path.
    pub fn insert(&self, object_name: &str, record_id: &str, data: RecordData, version: u64) {
        self.records.write().insert(
            (object_name.to_string(), record_id.to_string()),
            StoredRecord { data, version },
        );
    }

    /// Returns a stored record.
    pub fn get(&self, object_name: &str, record_id: &str) -> Option<RecordData> {
        self.records
            .read()
            .get(&(object_name.to_string(), record_id.to_string()))
            .map(|r| r.data.clone())
    }

    /// Returns the version a record was last written with.
    pub fn version_of(&self, object_name: &str, record_id: &str) -> Option<u64> {
        self.records
            .read()
            .get(&(object_name.to_string(), record_id.to_string()))
            .map(|r| r.version)
    }

    /// Makes every mutation of `object_name` fail to apply.
    pub fn fail_object(&self, object_name: impl Into<String>) {
        self.failing_objects.write().insert(object_name.into());
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl RecordResolver for MemoryRecordResolver {
    async fn get_record(&self, object_name: &str, record_id: &str) -> ServerResult<RecordData> {
        Ok(self.get(object_name, record_id).unwrap_or_default())
    }

    async fn apply_mutation(
        &self,
        mutation: &MutationLogEntry,
        new_version: u64,
    ) -> ServerResult<()> {
        if self.failing_objects.read().contains(&mutation.object_name) {
            return Err(ServerError::Resolver(format!(
                "writes to {} are refused",
                mutation.object_name
            )));
        }
        let key = (mutation.object_name.clone(), mutation.record_id.clone());
        let mut records = self.records.write();
        if !self.applied.write().insert(mutation.id.clone()) {
            // already written; only the version moves
            if let Some(stored) = records.get_mut(&key) {
                stored.version = new_version;
            }
            return Ok(());
        }

        match mutation.operation {
            Operation::Delete => {
                records.remove(&key);
            }
            Operation::Create | Operation::Update => {
                let stored = records.entry(key).or_insert_with(|| StoredRecord {
                    data: RecordData::new(),
                    version: 0,
                });
                if mutation.operation == Operation::Create {
                    stored.data.clear();
                }
                if let Some(data) = &mutation.data {
                    stored
                        .data
                        .extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                if !mutation
                    .data
                    .as_ref()
                    .is_some_and(|d| d.contains_key(UPDATED_AT_FIELD))
                {
                    stored.data.insert(
                        UPDATED_AT_FIELD.to_string(),
                        Value::String(
                            mutation
                                .timestamp
                                .to_rfc3339_opts(SecondsFormat::Millis, true),
                        ),
                    );
                }
                stored.version = new_version;
            }
        }
        Ok(())
    }
}
