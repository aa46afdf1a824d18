//! In-memory journal backend for testing.

use crate::backend::JournalBackend;
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;

/// An in-memory journal backend.
///
/// Holds all bytes in a single buffer. Suitable for unit tests, integration
/// tests, and restart simulation: take a snapshot with [`data`], drop the
/// store, and reopen a new backend [`with_data`] to model a process restart.
///
/// [`data`]: InMemoryBackend::data
/// [`with_data`]: InMemoryBackend::with_data
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    buf: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend seeded with existing journal bytes.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            buf: RwLock::new(data),
        }
    }

    /// Returns a copy of the full journal contents.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.buf.read().clone()
    }
}

impl JournalBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>> {
        let buf = self.buf.read();
        let start = offset as usize;
        let end = start.saturating_add(len);
        if offset > buf.len() as u64 || end > buf.len() {
            return Err(StoreError::ReadPastEnd {
                offset,
                len,
                size: buf.len() as u64,
            });
        }
        Ok(buf[start..end].to_vec())
    }

    fn append(&self, data: &[u8]) -> StoreResult<u64> {
        let mut buf = self.buf.write();
        let offset = buf.len() as u64;
        buf.extend_from_slice(data);
        Ok(offset)
    }

    fn sync(&self) -> StoreResult<()> {
        // Nothing buffered outside the process
        Ok(())
    }

    fn size(&self) -> StoreResult<u64> {
        Ok(self.buf.read().len() as u64)
    }

    fn replace(&self, data: &[u8]) -> StoreResult<()> {
        *self.buf.write() = data.to_vec();
        Ok(())
    }
}
