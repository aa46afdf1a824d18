//! # FieldSync Store
//!
//! Durable on-device queue for pending inspection findings and photos.
//!
//! This crate is the single source of truth for "what has not reached the
//! remote system of record yet". It provides:
//! - Journal-backed persistence (append-only, CRC-framed, replayed at open)
//! - Pending record lifecycle (`pending → syncing → synced | error`)
//! - Sync metadata (`last_sync` timestamp with a monotonic guard)
//! - Compaction that drops only fully synced records
//!
//! ## Durability
//!
//! Every mutating operation appends a full record snapshot to the journal
//! and flushes it before returning. There is no window between "the call
//! returned" and "the data survives a crash". Replay tolerates a torn tail:
//! a crash mid-append loses at most the record being written.
//!
//! ## Key Invariants
//!
//! - `local_id` is unique and immutable for the life of a record
//! - `Synced` is terminal; synced records are never mutated again
//! - A record in `Syncing` state is locked against capture-side edits
//! - Unsynced counts are always derived from the store, never cached

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod journal;
mod memory;
mod records;
mod store;

pub use backend::JournalBackend;
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use journal::{Journal, JournalRecord, RecordKind, JOURNAL_MAGIC, JOURNAL_VERSION};
pub use memory::InMemoryBackend;
pub use records::{
    BlobRef, FindingEdit, FindingStatus, NewFinding, NewPhoto, PendingFinding, PendingPhoto,
    PhotoEdit, SyncState, META_LAST_SYNC,
};
pub use store::LocalStore;
