//! # Resync Protocol
//!
//! Wire types and codecs for the resync mutation sync protocol.
//!
//! This crate provides:
//! - `MutationLogEntry` for client-side mutations awaiting confirmation
//! - Push messages (`SyncPushRequest`, `SyncPushResponse`)
//! - Per-mutation outcomes and `SyncConflict`
//! - `SyncServerChange` for changes flowing back from the server
//! - JSON and CBOR wire codecs
//! - Helpers over record data (field diffing, timestamps)
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Conflict responsibility
//!
//! The server only *detects* conflicts (via base-version comparison) and
//! reports them as data. Resolution is the client's job, on a later cycle,
//! through one of the resolvers in `resync_engine`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod codec;
mod error;
mod messages;
mod mutation;
pub mod record;

pub use codec::WireFormat;
pub use error::{CodecError, CodecResult};
pub use messages::{
    Checkpoint, MutationOutcome, SyncConflict, SyncMutationResult, SyncPushRequest,
    SyncPushResponse, SyncServerChange, DEFAULT_SYNC_PATH, EMPTY_CHECKPOINT,
};
pub use mutation::{MutationLogEntry, MutationSpec, Operation};
pub use record::RecordData;
