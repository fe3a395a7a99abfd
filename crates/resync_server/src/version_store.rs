//! Per-record version counters.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type RecordKey = (String, String);

/// Authoritative version of every record the server has accepted writes for.
///
/// A version record is created at 1 by the first successful mutation,
/// incremented by each later one, and removed when the record is deleted.
/// A record created again after a delete therefore restarts at 1.
#[derive(Debug, Default)]
pub struct VersionStore {
    versions: Mutex<HashMap<RecordKey, u64>>,
    locks: Mutex<HashMap<RecordKey, Arc<tokio::sync::Mutex<()>>>>,
}

fn key(object_name: &str, record_id: &str) -> RecordKey {
    (object_name.to_string(), record_id.to_string())
}

impl VersionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current version, or `None` if the record has none.
    pub fn get_version(&self, object_name: &str, record_id: &str) -> Option<u64> {
        self.versions
            .lock()
            .get(&key(object_name, record_id))
            .copied()
    }

    /// Increments the version and returns the new value (1 for a new record).
    pub fn increment(&self, object_name: &str, record_id: &str) -> u64 {
        let mut versions = self.versions.lock();
        let version = versions.entry(key(object_name, record_id)).or_insert(0);
        *version += 1;
        *version
    }

    /// Removes the version record. Returns the version it had.
    pub fn remove(&self, object_name: &str, record_id: &str) -> Option<u64> {
        self.versions.lock().remove(&key(object_name, record_id))
    }

    /// Returns the async lock serialising mutations of one record.
    ///
    /// The push handler holds it across the version check, the increment
    /// and the resolver's apply call, then hands it back through
    /// [`VersionStore::release_lock`].
    pub fn record_lock(&self, object_name: &str, record_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.locks
                .lock()
                .entry(key(object_name, record_id))
                .or_default(),
        )
    }

    /// Hands back a lock obtained from [`VersionStore::record_lock`].
    ///
    /// The lock is forgotten once no other caller holds or waits on it.
    /// Clones are only handed out under the map lock, so the count check
    /// cannot race with a new `record_lock` call.
    pub fn release_lock(
        &self,
        object_name: &str,
        record_id: &str,
        lock: Arc<tokio::sync::Mutex<()>>,
    ) {
        let mut locks = self.locks.lock();
        let key = key(object_name, record_id);
        let idle = locks
            .get(&key)
            .is_some_and(|stored| Arc::ptr_eq(stored, &lock) && Arc::strong_count(&lock) == 2);
        if idle {
            locks.remove(&key);
        }
    }

    /// Returns the number of records with a live lock.
    pub fn lock_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns the number of records with a version.
    pub fn len(&self) -> usize {
        self.versions.lock().len()
    }

    /// Returns true if no record has a version.
    pub fn is_empty(&self) -> bool {
        self.versions.lock().is_empty()
    }
}
