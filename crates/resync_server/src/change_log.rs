//! Server-side change log.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use resync_protocol::{Checkpoint, SyncServerChange, EMPTY_CHECKPOINT};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// A change plus the checkpoint it was recorded under.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeLogEntry {
    /// Position in the log; strictly increasing.
    pub checkpoint: u64,
    /// The accepted change.
    pub change: SyncServerChange,
    /// Id of the client mutation that produced the change, if known.
    pub mutation_id: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    entries: Vec<ChangeLogEntry>,
    last_checkpoint: u64,
    // mutation id -> server version, for retained entries only
    applied: HashMap<String, u64>,
}

/// Append-only, checkpoint-indexed log of every accepted mutation.
///
/// # Invariants
///
/// - Checkpoints are assigned from a counter that never goes backwards,
///   pruning included
/// - Entries are stored in checkpoint order
pub struct ChangeLog {
    state: RwLock<State>,
    retention: Duration,
}

impl ChangeLog {
    /// Creates an empty log with the given retention window.
    pub fn new(retention: Duration) -> Self {
        Self {
            state: RwLock::new(State::default()),
            retention,
        }
    }

    /// Returns the retention window.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Records a change under the next checkpoint.
    ///
    /// The change's timestamp is set to the current wall-clock time.
    pub fn record(&self, change: SyncServerChange) -> ChangeLogEntry {
        self.append(None, change)
    }

    /// Records a change produced by the client mutation `mutation_id`.
    ///
    /// While the entry is retained, [`ChangeLog::applied_version`] answers
    /// for that id.
    pub fn record_applied(
        &self,
        mutation_id: impl Into<String>,
        change: SyncServerChange,
    ) -> ChangeLogEntry {
        self.append(Some(mutation_id.into()), change)
    }

    /// Returns the server version a retained mutation was applied at.
    pub fn applied_version(&self, mutation_id: &str) -> Option<u64> {
        self.state.read().applied.get(mutation_id).copied()
    }

    fn append(&self, mutation_id: Option<String>, mut change: SyncServerChange) -> ChangeLogEntry {
        change.timestamp = Utc::now();

        let mut state = self.state.write();
        state.last_checkpoint += 1;
        if let Some(id) = &mutation_id {
            state.applied.insert(id.clone(), change.server_version);
        }
        let entry = ChangeLogEntry {
            checkpoint: state.last_checkpoint,
            change,
            mutation_id,
        };
        state.entries.push(entry.clone());
        entry
    }

    /// Returns changes recorded after `checkpoint`, oldest first.
    ///
    /// A missing or unparseable checkpoint, or one ahead of the log, is
    /// treated as "from the beginning" and yields every retained entry.
    pub fn changes_since(&self, checkpoint: Option<&str>) -> Vec<SyncServerChange> {
        let state = self.state.read();
        let cursor = checkpoint
            .and_then(|c| c.trim().parse::<u64>().ok())
            .filter(|c| *c <= state.last_checkpoint)
            .unwrap_or(0);

        let start = state.entries.partition_point(|e| e.checkpoint <= cursor);
        state.entries[start..]
            .iter()
            .map(|e| e.change.clone())
            .collect()
    }

    /// Returns the latest checkpoint, or `"0"` if nothing was recorded.
    pub fn current_checkpoint(&self) -> Checkpoint {
        match self.state.read().last_checkpoint {
            0 => EMPTY_CHECKPOINT.to_string(),
            n => n.to_string(),
        }
    }

    /// Removes entries older than the retention window.
    pub fn prune(&self) -> usize {
        let retention =
            ChronoDuration::from_std(self.retention).unwrap_or(ChronoDuration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.prune_before(cutoff)
    }

    /// Removes entries recorded before `cutoff`. Returns the count removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut state = self.state.write();
        let State {
            entries, applied, ..
        } = &mut *state;
        let before = entries.len();
        entries.retain(|e| {
            let keep = e.change.timestamp >= cutoff;
            if !keep {
                if let Some(id) = &e.mutation_id {
                    applied.remove(id);
                }
            }
            keep
        });
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "pruned change log");
        }
        removed
    }

    /// Returns the number of retained entries.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns true if no entries are retained.
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::new(Duration::from_secs(
            u64::from(crate::config::DEFAULT_RETENTION_DAYS) * 24 * 60 * 60,
        ))
    }
}
