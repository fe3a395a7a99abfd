//! # Resync Server
//!
//! Server side of the Resync mutation sync protocol.
//!
//! This crate provides:
//! - `VersionStore`: authoritative per-record versions
//! - `ChangeLog`: checkpoint-indexed log of accepted changes with
//!   age-based retention
//! - `SyncHandler`: push processing under optimistic concurrency
//! - `SyncServer`: handler plus stores, wire decoding and periodic pruning
//! - `RecordResolver`: the boundary to the application's record storage
//!
//! # Conflicts
//!
//! The server detects conflicts, it does not resolve them. A mutation
//! whose base version does not match the stored version comes back with
//! status `conflict`, the current server record and the configured fields
//! that differ. The client decides what to do on its next cycle.
//!
//! # Integration contract
//!
//! The handler assigns a version and then calls
//! [`RecordResolver::apply_mutation`]. Those two steps are only consistent
//! if the application persists the mutation atomically with the assigned
//! version and tolerates repeated delivery of the same mutation id.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod change_log;
mod config;
mod error;
mod handler;
mod record_resolver;
mod server;
mod version_store;

pub use change_log::{ChangeLog, ChangeLogEntry};
pub use config::{
    ServerConfig, SyncEndpointConfig, DEFAULT_MAX_MUTATIONS_PER_REQUEST, DEFAULT_RETENTION_DAYS,
};
pub use error::{ServerError, ServerResult};
pub use handler::SyncHandler;
pub use record_resolver::{MemoryRecordResolver, RecordResolver};
pub use server::{MIN_PRUNE_PERIOD, SyncServer};
pub use version_store::VersionStore;
