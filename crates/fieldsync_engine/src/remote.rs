//! Remote store abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use fieldsync_store::{PendingFinding, PendingPhoto};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

/// Acknowledgement for a finding upsert.
#[derive(Debug, Clone)]
pub struct RemoteAck {
    /// Id assigned by the remote store.
    pub remote_id: String,
}

/// Acknowledgement for a photo upload.
#[derive(Debug, Clone)]
pub struct PhotoAck {
    /// URL assigned by the remote store.
    pub remote_url: String,
}

/// The remote system of record, as seen by the sync executor.
///
/// Both operations are upserts keyed by the record's `local_id` and must
/// be idempotent: repeating a call with the same id after a lost
/// acknowledgement creates nothing new. Implementations own their own
/// connection handling; the executor applies the per-call timeout.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upserts a finding, returning the remote id.
    async fn upsert_finding(&self, finding: &PendingFinding) -> SyncResult<RemoteAck>;

    /// Uploads a photo, returning the remote URL.
    async fn upload_photo(&self, photo: &PendingPhoto) -> SyncResult<PhotoAck>;
}

/// A scripted failure for [`MockRemote`].
#[derive(Debug, Clone)]
struct ScriptedFailure {
    message: String,
    retryable: bool,
    /// How many calls still fail before the record starts succeeding.
    /// `u32::MAX` means "always".
    remaining: u32,
}

/// A mock remote store for testing.
///
/// Succeeds by default; individual records can be scripted to fail, and
/// the whole remote can be switched offline. Records every accepted
/// upsert so tests can assert on idempotence and call counts.
#[derive(Debug, Default)]
pub struct MockRemote {
    offline: AtomicBool,
    failures: Mutex<HashMap<Uuid, ScriptedFailure>>,
    finding_calls: AtomicUsize,
    photo_calls: AtomicUsize,
    accepted: Mutex<Vec<Uuid>>,
}

impl MockRemote {
    /// Creates a new mock remote, online and accepting everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches the remote online or offline. While offline every call
    /// fails with [`SyncError::Offline`].
    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    /// Scripts a record to always fail.
    pub fn fail_record(&self, local_id: Uuid, message: impl Into<String>, retryable: bool) {
        self.failures.lock().insert(
            local_id,
            ScriptedFailure {
                message: message.into(),
                retryable,
                remaining: u32::MAX,
            },
        );
    }

    /// Scripts a record to fail `times` calls, then succeed.
    pub fn fail_record_times(
        &self,
        local_id: Uuid,
        times: u32,
        message: impl Into<String>,
        retryable: bool,
    ) {
        self.failures.lock().insert(
            local_id,
            ScriptedFailure {
                message: message.into(),
                retryable,
                remaining: times,
            },
        );
    }

    /// Number of finding upsert calls received.
    #[must_use]
    pub fn finding_calls(&self) -> usize {
        self.finding_calls.load(Ordering::SeqCst)
    }

    /// Number of photo upload calls received.
    #[must_use]
    pub fn photo_calls(&self) -> usize {
        self.photo_calls.load(Ordering::SeqCst)
    }

    /// Ids of every accepted upsert, in arrival order.
    #[must_use]
    pub fn accepted(&self) -> Vec<Uuid> {
        self.accepted.lock().clone()
    }

    fn check(&self, local_id: Uuid) -> SyncResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Offline);
        }
        let mut failures = self.failures.lock();
        if let Some(failure) = failures.get_mut(&local_id) {
            if failure.remaining > 0 {
                if failure.remaining != u32::MAX {
                    failure.remaining -= 1;
                }
                return Err(SyncError::Remote {
                    message: failure.message.clone(),
                    retryable: failure.retryable,
                });
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemoteStore for MockRemote {
    async fn upsert_finding(&self, finding: &PendingFinding) -> SyncResult<RemoteAck> {
        self.finding_calls.fetch_add(1, Ordering::SeqCst);
        self.check(finding.local_id)?;
        self.accepted.lock().push(finding.local_id);
        Ok(RemoteAck {
            remote_id: format!("rec_{}", finding.local_id.simple()),
        })
    }

    async fn upload_photo(&self, photo: &PendingPhoto) -> SyncResult<PhotoAck> {
        self.photo_calls.fetch_add(1, Ordering::SeqCst);
        self.check(photo.local_id)?;
        self.accepted.lock().push(photo.local_id);
        Ok(PhotoAck {
            remote_url: format!("https://media.example.com/{}", photo.blob.digest),
        })
    }
}
