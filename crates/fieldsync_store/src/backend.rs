//! Journal backend trait definition.

use crate::error::StoreResult;

/// A low-level byte store backing the journal.
///
/// Backends are **opaque byte stores**. They know nothing about journal
/// framing, record payloads, or sync state; the [`crate::Journal`] owns all
/// format interpretation.
///
/// # Invariants
///
/// - `append` returns the offset where the data landed
/// - `read_at` returns exactly the bytes previously written at that offset
/// - after `sync` returns, all appended data survives process termination
/// - implementations must be `Send + Sync`; all methods take `&self` and
///   serialize access internally
pub trait JournalBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read extends beyond the current size or an
    /// I/O error occurs.
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>>;

    /// Appends data to the end of the store and returns its offset.
    fn append(&self, data: &[u8]) -> StoreResult<u64>;

    /// Forces all appended data down to durable storage.
    fn sync(&self) -> StoreResult<()>;

    /// Returns the current size in bytes (the offset of the next append).
    fn size(&self) -> StoreResult<u64>;

    /// Atomically replaces the entire contents with `data`. Used by
    /// compaction.
    ///
    /// The swap must be all-or-nothing from a crash-recovery standpoint:
    /// a reader opening the store after a crash sees either the old bytes
    /// or the new bytes, never a partial mix.
    ///
    /// # Errors
    ///
    /// Returns an error if the swap fails; the previous contents must
    /// remain intact in that case.
    fn replace(&self, data: &[u8]) -> StoreResult<()>;
}
