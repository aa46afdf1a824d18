//! Error types for store operations.

use crate::records::SyncState;
use std::io;
use thiserror::Error;
use uuid::Uuid;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of the journal.
    #[error("read beyond end of journal: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current journal size.
        size: u64,
    },

    /// The journal is corrupted beyond the recoverable tail.
    #[error("journal corrupted: {0}")]
    Corrupted(String),

    /// A record payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// No record exists with the given id.
    #[error("unknown record: {local_id}")]
    UnknownRecord {
        /// The id that was looked up.
        local_id: Uuid,
    },

    /// The record is currently being synced and cannot be edited.
    #[error("record {local_id} is locked by an in-flight sync")]
    RecordLocked {
        /// The id of the locked record.
        local_id: Uuid,
    },

    /// The record has already synced; its content is immutable.
    #[error("record {local_id} is already synced")]
    AlreadySynced {
        /// The id of the synced record.
        local_id: Uuid,
    },

    /// The record is not in the state the operation requires.
    #[error("record {local_id} is in state {state:?}, expected {expected:?}")]
    InvalidState {
        /// The id of the record.
        local_id: Uuid,
        /// The record's current state.
        state: SyncState,
        /// The state the operation requires.
        expected: SyncState,
    },
}
