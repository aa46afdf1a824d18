//! Pending record types and their sync lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Meta key holding the RFC 3339 timestamp of the last successful pass.
pub const META_LAST_SYNC: &str = "last_sync";

/// Outcome recorded for a checklist item in the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    /// Item passed inspection.
    Pass,
    /// Item failed inspection.
    Fail,
    /// Item was not applicable.
    Na,
    /// Item needs follow-up attention.
    NeedsAttention,
    /// Item needs urgent attention.
    Urgent,
}

/// Where a record sits in its journey to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Captured locally, waiting for the next sync pass.
    Pending,
    /// An upsert for this record is in flight. The record is locked
    /// against capture-side edits until the executor resolves it.
    Syncing,
    /// Acknowledged by the remote store. Terminal.
    Synced,
    /// The retry ceiling was exceeded or the remote rejected the record
    /// permanently; it needs manual attention before it is retried.
    Error,
}

impl SyncState {
    /// Returns true if the record still counts as an unsynced change.
    #[must_use]
    pub fn is_unsynced(&self) -> bool {
        !matches!(self, SyncState::Synced)
    }

    /// Returns true if the capture side may edit the record's content.
    #[must_use]
    pub fn is_editable(&self) -> bool {
        matches!(self, SyncState::Pending | SyncState::Error)
    }
}

/// Opaque content-addressed reference to a locally stored photo blob.
///
/// The store never interprets this; blob bytes live wherever the capture
/// layer put them, keyed by digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    /// Hex digest of the blob contents.
    pub digest: String,
    /// Blob length in bytes.
    pub len: u64,
}

impl BlobRef {
    /// Creates a blob reference.
    pub fn new(digest: impl Into<String>, len: u64) -> Self {
        Self {
            digest: digest.into(),
            len,
        }
    }
}

/// A finding captured in the field, queued for upsert to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFinding {
    /// Client-generated id, immutable for the record's life. This is the
    /// idempotency key presented to the remote upsert.
    pub local_id: Uuid,
    /// Inspection the finding belongs to.
    pub inspection_id: Uuid,
    /// Checklist item the finding answers.
    pub checklist_item_id: Uuid,
    /// Recorded outcome.
    pub status: FindingStatus,
    /// Free-form response text.
    pub response: Option<String>,
    /// Inspector notes.
    pub notes: Option<String>,
    /// Sync lifecycle state.
    pub sync_state: SyncState,
    /// Id assigned by the remote store once synced.
    pub remote_id: Option<String>,
    /// Number of failed sync attempts so far.
    pub retry_count: u32,
    /// Message from the most recent failed attempt.
    pub last_error: Option<String>,
    /// Timestamp of the last mutation.
    pub updated_at: DateTime<Utc>,
}

/// Capture-side input for a new finding.
#[derive(Debug, Clone)]
pub struct NewFinding {
    /// Inspection the finding belongs to.
    pub inspection_id: Uuid,
    /// Checklist item the finding answers.
    pub checklist_item_id: Uuid,
    /// Recorded outcome.
    pub status: FindingStatus,
    /// Free-form response text.
    pub response: Option<String>,
    /// Inspector notes.
    pub notes: Option<String>,
}

impl PendingFinding {
    /// Builds a pending record from capture input, assigning a fresh id.
    #[must_use]
    pub fn from_new(new: NewFinding) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            inspection_id: new.inspection_id,
            checklist_item_id: new.checklist_item_id,
            status: new.status,
            response: new.response,
            notes: new.notes,
            sync_state: SyncState::Pending,
            remote_id: None,
            retry_count: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Capture-side content edit for a finding. `None` fields are left as-is.
#[derive(Debug, Clone, Default)]
pub struct FindingEdit {
    /// New outcome, if changed.
    pub status: Option<FindingStatus>,
    /// New response text, if changed.
    pub response: Option<String>,
    /// New notes, if changed.
    pub notes: Option<String>,
}

/// A photo captured in the field, queued for upload to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPhoto {
    /// Client-generated id, immutable for the record's life.
    pub local_id: Uuid,
    /// Inspection the photo belongs to.
    pub inspection_id: Uuid,
    /// Checklist item the photo documents, if any.
    pub checklist_item_id: Option<Uuid>,
    /// Content-addressed reference to the locally stored bytes.
    pub blob: BlobRef,
    /// Optional caption.
    pub caption: Option<String>,
    /// Sync lifecycle state.
    pub sync_state: SyncState,
    /// URL assigned by the remote store once uploaded.
    pub remote_url: Option<String>,
    /// Number of failed upload attempts so far.
    pub retry_count: u32,
    /// Message from the most recent failed attempt.
    pub last_error: Option<String>,
    /// Timestamp of the last mutation.
    pub updated_at: DateTime<Utc>,
}

/// Capture-side input for a new photo.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    /// Inspection the photo belongs to.
    pub inspection_id: Uuid,
    /// Checklist item the photo documents, if any.
    pub checklist_item_id: Option<Uuid>,
    /// Content-addressed reference to the locally stored bytes.
    pub blob: BlobRef,
    /// Optional caption.
    pub caption: Option<String>,
}

impl PendingPhoto {
    /// Builds a pending record from capture input, assigning a fresh id.
    #[must_use]
    pub fn from_new(new: NewPhoto) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            inspection_id: new.inspection_id,
            checklist_item_id: new.checklist_item_id,
            blob: new.blob,
            caption: new.caption,
            sync_state: SyncState::Pending,
            remote_url: None,
            retry_count: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Capture-side content edit for a photo. `None` fields are left as-is.
#[derive(Debug, Clone, Default)]
pub struct PhotoEdit {
    /// New caption, if changed.
    pub caption: Option<String>,
}
