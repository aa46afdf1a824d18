//! Append-only journal framing and replay.

use crate::backend::JournalBackend;
use crate::error::{StoreError, StoreResult};
use crate::records::{PendingFinding, PendingPhoto};
use std::sync::Arc;

/// Magic bytes identifying a journal frame.
pub const JOURNAL_MAGIC: [u8; 4] = *b"FSJL";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// Frame header size: magic (4) + version (2) + kind (1) + length (4).
const HEADER_SIZE: usize = 11;

/// CRC32 trailer size.
const CRC_SIZE: usize = 4;

/// Type of journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Full snapshot of a finding.
    Finding = 1,
    /// Full snapshot of a photo.
    Photo = 2,
    /// Sync metadata key/value write.
    Meta = 3,
}

impl RecordKind {
    /// Converts a byte to a record kind.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Finding),
            2 => Some(Self::Photo),
            3 => Some(Self::Meta),
            _ => None,
        }
    }

    /// Converts the record kind to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A journal record: the full snapshot written on every mutation.
///
/// Replay applies records in order; the last snapshot per `local_id` (or
/// meta key) wins.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum JournalRecord {
    /// Snapshot of a finding after a mutation.
    Finding(PendingFinding),
    /// Snapshot of a photo after a mutation.
    Photo(PendingPhoto),
    /// Sync metadata write.
    Meta {
        /// Meta key.
        key: String,
        /// Meta value.
        value: String,
    },
}

impl JournalRecord {
    /// Returns the record kind.
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Finding(_) => RecordKind::Finding,
            Self::Photo(_) => RecordKind::Photo,
            Self::Meta { .. } => RecordKind::Meta,
        }
    }

    fn encode_payload(&self) -> StoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        let result = match self {
            Self::Finding(f) => ciborium::into_writer(f, &mut buf),
            Self::Photo(p) => ciborium::into_writer(p, &mut buf),
            Self::Meta { key, value } => {
                ciborium::into_writer(&(key.as_str(), value.as_str()), &mut buf)
            }
        };
        result.map_err(|e| StoreError::Codec(e.to_string()))?;
        Ok(buf)
    }

    fn decode_payload(kind: RecordKind, payload: &[u8]) -> StoreResult<Self> {
        match kind {
            RecordKind::Finding => ciborium::from_reader(payload)
                .map(Self::Finding)
                .map_err(|e| StoreError::Codec(e.to_string())),
            RecordKind::Photo => ciborium::from_reader(payload)
                .map(Self::Photo)
                .map_err(|e| StoreError::Codec(e.to_string())),
            RecordKind::Meta => {
                let (key, value): (String, String) = ciborium::from_reader(payload)
                    .map_err(|e| StoreError::Codec(e.to_string()))?;
                Ok(Self::Meta { key, value })
            }
        }
    }
}

/// Manages framed writes to and replay from a journal backend.
///
/// Every append is flushed before returning, so an acknowledged write
/// survives a crash. Replay stops cleanly at a torn or corrupt tail:
/// a crash mid-append loses at most the frame being written.
pub struct Journal {
    backend: Arc<dyn JournalBackend>,
}

impl Journal {
    /// Creates a journal over the given backend.
    pub fn new(backend: Arc<dyn JournalBackend>) -> Self {
        Self { backend }
    }

    /// Appends a record frame and syncs it to durable storage.
    ///
    /// Returns the offset where the frame was written.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the backend write fails.
    pub fn append(&self, record: &JournalRecord) -> StoreResult<u64> {
        let frame = encode_frame(record)?;
        let offset = self.backend.append(&frame)?;
        self.backend.sync()?;
        Ok(offset)
    }

    /// Replays all intact frames from the start of the journal.
    ///
    /// A frame with a short header, short payload, bad magic, or failing
    /// CRC terminates the replay; everything before it is returned. This is
    /// how a torn tail from a crash mid-append is recovered from.
    ///
    /// # Errors
    ///
    /// Returns an error only for backend I/O failures or an unsupported
    /// format version; tail damage is not an error.
    pub fn replay(&self) -> StoreResult<Vec<JournalRecord>> {
        let size = self.backend.size()?;
        let mut records = Vec::new();
        let mut offset = 0u64;

        while offset + (HEADER_SIZE as u64) <= size {
            let header = self.backend.read_at(offset, HEADER_SIZE)?;
            if header[0..4] != JOURNAL_MAGIC {
                break;
            }
            let version = u16::from_le_bytes([header[4], header[5]]);
            if version != JOURNAL_VERSION {
                return Err(StoreError::Corrupted(format!(
                    "unsupported journal version {version}"
                )));
            }
            let Some(kind) = RecordKind::from_byte(header[6]) else {
                break;
            };
            let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

            let frame_len = (HEADER_SIZE + len + CRC_SIZE) as u64;
            if offset + frame_len > size {
                break;
            }

            let payload = self.backend.read_at(offset + HEADER_SIZE as u64, len)?;
            let crc_bytes = self
                .backend
                .read_at(offset + (HEADER_SIZE + len) as u64, CRC_SIZE)?;
            let stored_crc =
                u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

            let mut covered = header;
            covered.extend_from_slice(&payload);
            if crc32(&covered) != stored_crc {
                break;
            }

            match JournalRecord::decode_payload(kind, &payload) {
                Ok(record) => records.push(record),
                // Framing was intact but the payload is unreadable; treat
                // like a torn tail rather than refusing to open the store.
                Err(_) => break,
            }

            offset += frame_len;
        }

        Ok(records)
    }

    /// Rewrites the journal to contain exactly the given records.
    ///
    /// Used by compaction. The replacement image is built in full and
    /// installed with one atomic [`JournalBackend::replace`], so a crash
    /// mid-rewrite leaves either the old journal or the new one, never a
    /// partial mix.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the swap fails; the previous
    /// contents remain intact in that case.
    pub fn rewrite(&self, records: &[JournalRecord]) -> StoreResult<()> {
        let mut image = Vec::new();
        for record in records {
            image.extend_from_slice(&encode_frame(record)?);
        }
        self.backend.replace(&image)?;
        self.backend.sync()
    }

    /// Returns the current journal size in bytes.
    pub fn size(&self) -> StoreResult<u64> {
        self.backend.size()
    }
}

fn encode_frame(record: &JournalRecord) -> StoreResult<Vec<u8>> {
    let payload = record.encode_payload()?;
    let len = u32::try_from(payload.len())
        .map_err(|_| StoreError::Codec("record payload exceeds 4 GiB".into()))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    frame.extend_from_slice(&JOURNAL_MAGIC);
    frame.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
    frame.push(record.kind().as_byte());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    let crc = crc32(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// CRC32 (IEEE polynomial), bitwise variant.
fn crc32(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use crate::records::{FindingStatus, NewFinding, PendingFinding};
    use uuid::Uuid;

    fn make_finding() -> PendingFinding {
        PendingFinding::from_new(NewFinding {
            inspection_id: Uuid::new_v4(),
            checklist_item_id: Uuid::new_v4(),
            status: FindingStatus::NeedsAttention,
            response: Some("loose railing".into()),
            notes: None,
        })
    }

    #[test]
    fn crc32_known_vector() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn record_kind_round_trip() {
        for kind in [RecordKind::Finding, RecordKind::Photo, RecordKind::Meta] {
            assert_eq!(RecordKind::from_byte(kind.as_byte()), Some(kind));
        }
        assert_eq!(RecordKind::from_byte(0), None);
        assert_eq!(RecordKind::from_byte(99), None);
    }

    #[test]
    fn append_then_replay() {
        let backend = Arc::new(InMemoryBackend::new());
        let journal = Journal::new(backend);

        let finding = make_finding();
        journal.append(&JournalRecord::Finding(finding.clone())).unwrap();
        journal
            .append(&JournalRecord::Meta {
                key: "last_sync".into(),
                value: "2026-08-26T10:00:00Z".into(),
            })
            .unwrap();

        let records = journal.replay().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], JournalRecord::Finding(finding));
        assert!(matches!(&records[1], JournalRecord::Meta { key, .. } if key == "last_sync"));
    }

    #[test]
    fn torn_tail_is_dropped() {
        let backend = Arc::new(InMemoryBackend::new());
        let journal = Journal::new(Arc::clone(&backend) as Arc<dyn JournalBackend>);
        journal.append(&JournalRecord::Finding(make_finding())).unwrap();

        // Simulate a crash mid-append: a second frame cut short.
        let mut bytes = backend.data();
        let intact_len = bytes.len();
        bytes.extend_from_slice(&JOURNAL_MAGIC);
        bytes.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        bytes.push(RecordKind::Finding.as_byte());
        bytes.extend_from_slice(&1000u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 5]);
        assert!(bytes.len() > intact_len);

        let reopened = Journal::new(Arc::new(InMemoryBackend::with_data(bytes)));
        let records = reopened.replay().unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn corrupt_crc_stops_replay() {
        let backend = Arc::new(InMemoryBackend::new());
        let journal = Journal::new(Arc::clone(&backend) as Arc<dyn JournalBackend>);
        journal.append(&JournalRecord::Finding(make_finding())).unwrap();
        journal.append(&JournalRecord::Finding(make_finding())).unwrap();

        // Flip a byte in the second frame's payload.
        let mut bytes = backend.data();
        let last = bytes.len() - (CRC_SIZE + 1);
        bytes[last] ^= 0xFF;

        let reopened = Journal::new(Arc::new(InMemoryBackend::with_data(bytes)));
        let records = reopened.replay().unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn rewrite_compacts() {
        let backend = Arc::new(InMemoryBackend::new());
        let journal = Journal::new(Arc::clone(&backend) as Arc<dyn JournalBackend>);
        for _ in 0..5 {
            journal.append(&JournalRecord::Finding(make_finding())).unwrap();
        }
        let size_before = journal.size().unwrap();

        let keep = make_finding();
        journal.rewrite(&[JournalRecord::Finding(keep.clone())]).unwrap();
        assert!(journal.size().unwrap() < size_before);

        let records = journal.replay().unwrap();
        assert_eq!(records, vec![JournalRecord::Finding(keep)]);
    }

    #[test]
    fn empty_journal_replays_empty() {
        let journal = Journal::new(Arc::new(InMemoryBackend::new()));
        assert!(journal.replay().unwrap().is_empty());
    }
}
