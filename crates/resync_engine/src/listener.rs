//! Sync lifecycle listeners.

use crate::error::SyncError;
use parking_lot::RwLock;
use resync_protocol::{SyncConflict, SyncPushResponse, SyncServerChange};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Observer of sync lifecycle events.
///
/// Every hook has an empty default, so implementors override only what
/// they need. Hooks run synchronously on the task driving the sync.
pub trait SyncListener: Send + Sync {
    /// A push is about to be sent.
    fn on_sync_start(&self) {}

    /// A push round-trip finished.
    fn on_sync_complete(&self, _response: &SyncPushResponse) {}

    /// The transport failed; pending mutations were kept.
    fn on_sync_error(&self, _error: &SyncError) {}

    /// The server reported conflicts for some mutations.
    fn on_conflict(&self, _conflicts: &[SyncConflict]) {}

    /// The server returned changes this client had not seen.
    fn on_server_changes(&self, _changes: &[SyncServerChange]) {}
}

/// Handle returned by `add_listener`, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registered listeners.
///
/// A listener that panics is logged and skipped; the remaining listeners
/// and the sync cycle carry on.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ListenerId, Arc<dyn SyncListener>)>>,
}

impl Listeners {
    pub(crate) fn add(&self, listener: Arc<dyn SyncListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Invokes `hook` on every listener.
    ///
    /// The registry is snapshotted first so a hook may add or remove
    /// listeners without deadlocking.
    pub(crate) fn emit(&self, event: &'static str, hook: impl Fn(&dyn SyncListener)) {
        let snapshot: Vec<_> = self.entries.read().clone();
        for (id, listener) in snapshot {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| hook(listener.as_ref())));
            if outcome.is_err() {
                warn!(listener = id.0, event, "sync listener panicked; ignoring");
            }
        }
    }
}
