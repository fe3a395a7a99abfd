//! Client-side conflict resolution.
//!
//! The server only reports conflicts. Once a [`SyncConflict`] reaches the
//! client, a resolver decides whether the mutation should be treated as
//! applied or stay conflicting. Resolvers are synchronous and never talk to
//! the server, so any version they report is tentative until the server
//! accepts a follow-up mutation.

use resync_protocol::record::{self, RecordData};
use resync_protocol::{SyncConflict, SyncMutationResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Callback used by the manual strategy.
///
/// Returns merged data to accept, or `None` to leave the conflict for the
/// user interface.
pub type ManualResolveFn = Arc<dyn Fn(&SyncConflict) -> Option<RecordData> + Send + Sync>;

/// Decides the fate of a conflicting mutation.
pub trait ConflictResolver: Send + Sync {
    /// Resolves a single conflict.
    fn resolve(&self, conflict: &SyncConflict) -> SyncMutationResult;

    /// Returns the strategy this resolver implements.
    fn strategy(&self) -> ConflictStrategy;
}

/// Named conflict resolution strategies.
///
/// Parsing never fails: any unrecognised name selects
/// [`ConflictStrategy::LastWriteWins`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConflictStrategy {
    /// Newest write wins, ties favour the client.
    #[default]
    LastWriteWins,
    /// Field-level merge; conflicting fields keep the server value.
    Crdt,
    /// Defer to an application callback.
    Manual,
}

impl ConflictStrategy {
    /// Resolves a strategy by name, falling back to last-write-wins.
    pub fn from_name(name: &str) -> Self {
        match name {
            "last-write-wins" => ConflictStrategy::LastWriteWins,
            "crdt" => ConflictStrategy::Crdt,
            "manual" => ConflictStrategy::Manual,
            _ => ConflictStrategy::LastWriteWins,
        }
    }

    /// Returns the strategy name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::LastWriteWins => "last-write-wins",
            ConflictStrategy::Crdt => "crdt",
            ConflictStrategy::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ConflictStrategy {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl From<ConflictStrategy> for String {
    fn from(strategy: ConflictStrategy) -> Self {
        strategy.as_str().to_string()
    }
}

/// Last-write-wins by wall-clock timestamp.
///
/// Compares the client mutation's timestamp with the server record's
/// `updated_at`. Equal timestamps favour the client.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriteWinsResolver;

impl ConflictResolver for LastWriteWinsResolver {
    fn resolve(&self, conflict: &SyncConflict) -> SyncMutationResult {
        let mutation = &conflict.client_mutation;
        let server_time = record::updated_at(&conflict.server_record);

        if mutation.timestamp >= server_time {
            SyncMutationResult::applied(mutation.id.clone(), mutation.next_version())
        } else {
            SyncMutationResult::conflict_with_suggestion(
                conflict.clone(),
                conflict.server_record.clone(),
            )
        }
    }

    fn strategy(&self) -> ConflictStrategy {
        ConflictStrategy::LastWriteWins
    }
}

/// Field-level last-writer-wins register merge.
///
/// Non-conflicting client fields are merged over the server record;
/// fields listed as conflicting keep the server's value. There is no
/// conflict outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrdtResolver;

impl ConflictResolver for CrdtResolver {
    fn resolve(&self, conflict: &SyncConflict) -> SyncMutationResult {
        let mutation = &conflict.client_mutation;
        let merged = record::merge_keeping_server(
            &conflict.server_record,
            mutation.data.as_ref(),
            &conflict.conflicting_fields,
        );
        SyncMutationResult::applied_with(mutation.id.clone(), mutation.next_version(), merged)
    }

    fn strategy(&self) -> ConflictStrategy {
        ConflictStrategy::Crdt
    }
}

/// Delegates to an application callback.
#[derive(Clone, Default)]
pub struct ManualResolver {
    callback: Option<ManualResolveFn>,
}

impl ManualResolver {
    /// Creates a manual resolver.
    pub fn new(callback: Option<ManualResolveFn>) -> Self {
        Self { callback }
    }
}

impl fmt::Debug for ManualResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualResolver")
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl ConflictResolver for ManualResolver {
    fn resolve(&self, conflict: &SyncConflict) -> SyncMutationResult {
        let mutation = &conflict.client_mutation;
        match self.callback.as_ref().and_then(|cb| cb(conflict)) {
            Some(merged) => {
                SyncMutationResult::applied_with(mutation.id.clone(), mutation.next_version(), merged)
            }
            None => SyncMutationResult::conflict(conflict.clone()),
        }
    }

    fn strategy(&self) -> ConflictStrategy {
        ConflictStrategy::Manual
    }
}

/// Builds a resolver for a strategy.
///
/// `manual` is only consulted by the manual strategy.
pub fn resolver_for(
    strategy: ConflictStrategy,
    manual: Option<ManualResolveFn>,
) -> Box<dyn ConflictResolver> {
    match strategy {
        ConflictStrategy::LastWriteWins => Box::new(LastWriteWinsResolver),
        ConflictStrategy::Crdt => Box::new(CrdtResolver),
        ConflictStrategy::Manual => Box::new(ManualResolver::new(manual)),
    }
}

/// Builds a resolver from a strategy name.
///
/// Unknown names silently select last-write-wins.
pub fn create_resolver(name: &str, manual: Option<ManualResolveFn>) -> Box<dyn ConflictResolver> {
    resolver_for(ConflictStrategy::from_name(name), manual)
}
