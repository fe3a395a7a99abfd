//! Client-side mutation log.

use crate::error::{SyncError, SyncResult};
use chrono::Utc;
use resync_protocol::{MutationLogEntry, MutationSpec};
use std::collections::{HashSet, VecDeque};
use uuid::Uuid;

/// An append-only log of mutations the server has not yet confirmed.
///
/// # Invariants
///
/// - Entries are kept in append order
/// - Sequence numbers are strictly increasing and never reused, even
///   across [`clear`](Self::clear)
/// - An entry leaves the log only through [`acknowledge`](Self::acknowledge)
///   or [`clear`](Self::clear)
#[derive(Debug)]
pub struct MutationLogger {
    client_id: String,
    entries: VecDeque<MutationLogEntry>,
    last_sequence: u64,
}

impl MutationLogger {
    /// Creates an empty log for `client_id`.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            entries: VecDeque::new(),
            last_sequence: 0,
        }
    }

    /// Restores a log from persisted state.
    ///
    /// Numbering resumes after the greater of `last_sequence` and the
    /// highest restored sequence.
    pub fn from_state(
        client_id: impl Into<String>,
        last_sequence: u64,
        entries: Vec<MutationLogEntry>,
    ) -> Self {
        let highest = entries.iter().map(|e| e.sequence).max().unwrap_or(0);
        Self {
            client_id: client_id.into(),
            entries: entries.into(),
            last_sequence: last_sequence.max(highest),
        }
    }

    /// Returns the client id stamped on every entry.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the last sequence number handed out.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Appends a mutation and returns a copy of the stored entry.
    pub fn append(&mut self, spec: MutationSpec) -> SyncResult<MutationLogEntry> {
        if !spec.has_valid_base() {
            return Err(SyncError::InvalidMutation(format!(
                "{} of {}/{} requires a base version",
                spec.operation, spec.object_name, spec.record_id
            )));
        }

        self.last_sequence += 1;
        let entry = MutationLogEntry {
            id: Uuid::new_v4().to_string(),
            object_name: spec.object_name,
            record_id: spec.record_id,
            operation: spec.operation,
            data: spec.data,
            timestamp: Utc::now(),
            client_id: self.client_id.clone(),
            sequence: self.last_sequence,
            base_version: spec.base_version,
        };

        self.entries.push_back(entry.clone());
        Ok(entry)
    }

    /// Returns a snapshot of all pending entries in append order.
    pub fn pending(&self) -> Vec<MutationLogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Returns pending entries for one object, in append order.
    pub fn pending_for_object(&self, object_name: &str) -> Vec<MutationLogEntry> {
        self.entries
            .iter()
            .filter(|e| e.object_name == object_name)
            .cloned()
            .collect()
    }

    /// Returns up to `limit` of the oldest pending entries.
    pub fn pending_batch(&self, limit: usize) -> Vec<MutationLogEntry> {
        self.entries.iter().take(limit).cloned().collect()
    }

    /// Removes every entry whose id is in `ids`.
    ///
    /// Unknown ids are ignored. Returns the number of entries removed.
    pub fn acknowledge<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: HashSet<String> = ids.into_iter().map(|id| id.as_ref().to_owned()).collect();
        if ids.is_empty() {
            return 0;
        }

        let before = self.entries.len();
        self.entries.retain(|e| !ids.contains(&e.id));
        before - self.entries.len()
    }

    /// Drops all pending entries. The sequence counter keeps running.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use resync_protocol::{Operation, RecordData};
    use serde_json::json;

    fn data() -> RecordData {
        json!({"title": "x"}).as_object().cloned().unwrap()
    }

    fn create(record_id: &str) -> MutationSpec {
        MutationSpec::create("task", record_id, data())
    }

    #[test]
    fn append_assigns_identity() {
        let mut log = MutationLogger::new("client-a");

        let first = log.append(create("t1")).unwrap();
        let second = log.append(create("t2")).unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_ne!(first.id, second.id);
        assert_eq!(first.client_id, "client-a");
        assert!(first.timestamp <= second.timestamp);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn append_rejects_update_without_base() {
        let mut log = MutationLogger::new("c");
        let mut spec = MutationSpec::update("task", "t1", data(), 1);
        spec.base_version = None;

        let result = log.append(spec);
        assert!(matches!(result, Err(SyncError::InvalidMutation(_))));
        assert!(log.is_empty());
        assert_eq!(log.last_sequence(), 0);
    }

    #[test]
    fn pending_preserves_order_and_filters() {
        let mut log = MutationLogger::new("c");
        log.append(create("t1")).unwrap();
        log.append(MutationSpec::create("note", "n1", data())).unwrap();
        log.append(MutationSpec::update("task", "t1", data(), 1))
            .unwrap();

        let all: Vec<_> = log.pending().into_iter().map(|e| e.sequence).collect();
        assert_eq!(all, vec![1, 2, 3]);

        let tasks = log.pending_for_object("task");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].operation, Operation::Update);
    }

    #[test]
    fn acknowledge_removes_only_known_ids() {
        let mut log = MutationLogger::new("c");
        let a = log.append(create("a")).unwrap();
        let b = log.append(create("b")).unwrap();
        let c = log.append(create("c")).unwrap();

        assert_eq!(log.acknowledge([b.id.as_str(), "unknown"]), 1);
        let remaining: Vec<_> = log.pending().into_iter().map(|e| e.id).collect();
        assert_eq!(remaining, vec![a.id.clone(), c.id.clone()]);

        // Second acknowledgement of the same id is a no-op.
        assert_eq!(log.acknowledge([b.id.as_str()]), 0);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn pending_batch_is_fifo() {
        let mut log = MutationLogger::new("c");
        for i in 0..5 {
            log.append(create(&format!("t{i}"))).unwrap();
        }

        let batch = log.pending_batch(3);
        let seqs: Vec<_> = batch.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(log.pending_batch(10).len(), 5);
    }

    #[test]
    fn clear_keeps_sequence_running() {
        let mut log = MutationLogger::new("c");
        log.append(create("a")).unwrap();
        log.append(create("b")).unwrap();
        log.clear();

        assert!(log.is_empty());
        let next = log.append(create("c")).unwrap();
        assert_eq!(next.sequence, 3);
    }

    #[test]
    fn from_state_resumes_numbering() {
        let mut original = MutationLogger::new("c");
        original.append(create("a")).unwrap();
        original.append(create("b")).unwrap();

        let mut restored = MutationLogger::from_state("c", 1, original.pending());
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.last_sequence(), 2);
        assert_eq!(restored.append(create("c")).unwrap().sequence, 3);

        let mut ahead = MutationLogger::from_state("c", 10, Vec::new());
        assert_eq!(ahead.append(create("d")).unwrap().sequence, 11);
    }

    proptest! {
        #[test]
        fn sequences_are_dense_and_ids_distinct(n in 1usize..64) {
            let mut log = MutationLogger::new("prop");
            for i in 0..n {
                log.append(create(&format!("r{i}"))).unwrap();
            }

            let entries = log.pending();
            let ids: HashSet<_> = entries.iter().map(|e| e.id.clone()).collect();
            prop_assert_eq!(ids.len(), n);
            for (i, entry) in entries.iter().enumerate() {
                prop_assert_eq!(entry.sequence, i as u64 + 1);
            }
        }

        #[test]
        fn double_acknowledge_is_idempotent(n in 1usize..32, pick in 0usize..32) {
            let mut log = MutationLogger::new("prop");
            for i in 0..n {
                log.append(create(&format!("r{i}"))).unwrap();
            }
            let id = log.pending()[pick % n].id.clone();

            log.acknowledge([id.as_str()]);
            let after_first = log.len();
            log.acknowledge([id.as_str()]);
            prop_assert_eq!(log.len(), after_first);
            prop_assert_eq!(after_first, n - 1);
        }
    }
}
