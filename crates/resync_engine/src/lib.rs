//! # Resync Engine
//!
//! Offline-first client sync for Resync.
//!
//! This crate provides:
//! - An append-only mutation log with monotonic sequence numbers
//! - Conflict resolvers (last-write-wins, field-level CRDT merge, manual)
//! - The sync engine: debounced, batched, single-flight push cycles
//! - Lifecycle listeners
//! - Transport abstraction with HTTP and mock implementations
//!
//! ## Architecture
//!
//! Local writes are recorded in the [`MutationLogger`] and pushed to the
//! server in FIFO batches. The server applies each mutation under
//! optimistic concurrency: a mutation whose base version no longer matches
//! is reported back as a conflict. **The server detects, the client
//! resolves**: conflicts reach listeners untouched and the application
//! decides what to do with them, typically through
//! [`SyncEngine::resolve_conflict`].
//!
//! ## Key Invariants
//!
//! - A mutation stays in the log until the server reports it applied
//! - Delivery is at-least-once; conflicted or rejected mutations are resent
//! - At most one push is in flight per engine
//! - The checkpoint only advances on a successful push

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used)]

mod config;
mod engine;
mod error;
mod http;
mod listener;
mod mutation_log;
mod resolver;
mod scheduler;
mod transport;

pub use config::{SyncConfig, SyncDirection, DEFAULT_BATCH_SIZE, DEFAULT_DEBOUNCE_MS};
pub use engine::{SyncEngine, SyncStats};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use listener::{ListenerId, SyncListener};
pub use mutation_log::MutationLogger;
pub use resolver::{
    create_resolver, resolver_for, ConflictResolver, ConflictStrategy, CrdtResolver,
    LastWriteWinsResolver, ManualResolveFn, ManualResolver,
};
pub use transport::{MockTransport, SyncTransport};
