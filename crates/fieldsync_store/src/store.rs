//! The durable local store: replayed in-memory state over the journal.

use crate::backend::JournalBackend;
use crate::error::{StoreError, StoreResult};
use crate::journal::{Journal, JournalRecord};
use crate::records::{
    FindingEdit, NewFinding, NewPhoto, PendingFinding, PendingPhoto, PhotoEdit, SyncState,
    META_LAST_SYNC,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// The on-device queue of pending findings, photos, and sync metadata.
///
/// Opened by replaying the journal; after that, reads are served from
/// memory and every mutation writes a full record snapshot through the
/// journal before the in-memory state changes. This makes the store the
/// single source of truth for unsynced work across process restarts.
pub struct LocalStore {
    journal: Journal,
    findings: RwLock<HashMap<Uuid, PendingFinding>>,
    photos: RwLock<HashMap<Uuid, PendingPhoto>>,
    meta: RwLock<HashMap<String, String>>,
}

impl LocalStore {
    /// Opens a store over the given backend, replaying existing records.
    ///
    /// An empty or missing journal yields an empty store. Records that were
    /// mid-sync when the process died (`Syncing` state) are released back
    /// to `Pending` so they are picked up by the next pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be read.
    pub fn open(backend: Arc<dyn JournalBackend>) -> StoreResult<Self> {
        let journal = Journal::new(backend);
        let mut findings: HashMap<Uuid, PendingFinding> = HashMap::new();
        let mut photos: HashMap<Uuid, PendingPhoto> = HashMap::new();
        let mut meta: HashMap<String, String> = HashMap::new();

        for record in journal.replay()? {
            match record {
                JournalRecord::Finding(mut f) => {
                    if f.sync_state == SyncState::Syncing {
                        f.sync_state = SyncState::Pending;
                    }
                    findings.insert(f.local_id, f);
                }
                JournalRecord::Photo(mut p) => {
                    if p.sync_state == SyncState::Syncing {
                        p.sync_state = SyncState::Pending;
                    }
                    photos.insert(p.local_id, p);
                }
                JournalRecord::Meta { key, value } => {
                    if key == META_LAST_SYNC && !is_newer_timestamp(&meta, &value) {
                        continue;
                    }
                    meta.insert(key, value);
                }
            }
        }

        Ok(Self {
            journal,
            findings: RwLock::new(findings),
            photos: RwLock::new(photos),
            meta: RwLock::new(meta),
        })
    }

    // ---- capture side ----

    /// Enqueues a newly captured finding. Durable once this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal write fails.
    pub fn enqueue_finding(&self, new: NewFinding) -> StoreResult<PendingFinding> {
        let finding = PendingFinding::from_new(new);
        self.persist_finding(finding.clone())?;
        Ok(finding)
    }

    /// Enqueues a newly captured photo. Durable once this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal write fails.
    pub fn enqueue_photo(&self, new: NewPhoto) -> StoreResult<PendingPhoto> {
        let photo = PendingPhoto::from_new(new);
        self.persist_photo(photo.clone())?;
        Ok(photo)
    }

    /// Applies a content edit to a finding.
    ///
    /// Rejected while the record is mid-sync (`RecordLocked`) or once it
    /// has synced (`AlreadySynced`). Editing a record parked in `Error`
    /// state requeues it: the state returns to `Pending` with a fresh
    /// retry budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is unknown, locked, already synced,
    /// or the journal write fails.
    pub fn update_finding(&self, local_id: Uuid, edit: FindingEdit) -> StoreResult<PendingFinding> {
        let mut finding = self
            .finding(local_id)
            .ok_or(StoreError::UnknownRecord { local_id })?;
        check_editable(local_id, finding.sync_state)?;

        if let Some(status) = edit.status {
            finding.status = status;
        }
        if let Some(response) = edit.response {
            finding.response = Some(response);
        }
        if let Some(notes) = edit.notes {
            finding.notes = Some(notes);
        }
        if finding.sync_state == SyncState::Error {
            finding.sync_state = SyncState::Pending;
            finding.retry_count = 0;
        }
        finding.updated_at = Utc::now();

        self.persist_finding(finding.clone())?;
        Ok(finding)
    }

    /// Applies a content edit to a photo. Same locking rules as
    /// [`update_finding`](Self::update_finding).
    ///
    /// # Errors
    ///
    /// Returns an error if the record is unknown, locked, already synced,
    /// or the journal write fails.
    pub fn update_photo(&self, local_id: Uuid, edit: PhotoEdit) -> StoreResult<PendingPhoto> {
        let mut photo = self
            .photo(local_id)
            .ok_or(StoreError::UnknownRecord { local_id })?;
        check_editable(local_id, photo.sync_state)?;

        if let Some(caption) = edit.caption {
            photo.caption = Some(caption);
        }
        if photo.sync_state == SyncState::Error {
            photo.sync_state = SyncState::Pending;
            photo.retry_count = 0;
        }
        photo.updated_at = Utc::now();

        self.persist_photo(photo.clone())?;
        Ok(photo)
    }

    // ---- executor side ----

    /// Moves a record from `Pending` to `Syncing`, taking the per-record
    /// edit lock.
    ///
    /// Returns `Ok(false)` if the record is not currently `Pending` (it
    /// was resolved or parked since the snapshot); the caller should skip
    /// it rather than fail the pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is unknown or the journal write
    /// fails.
    pub fn begin_sync(&self, local_id: Uuid) -> StoreResult<bool> {
        if let Some(mut finding) = self.finding(local_id) {
            if finding.sync_state != SyncState::Pending {
                return Ok(false);
            }
            finding.sync_state = SyncState::Syncing;
            finding.updated_at = Utc::now();
            self.persist_finding(finding)?;
            return Ok(true);
        }
        if let Some(mut photo) = self.photo(local_id) {
            if photo.sync_state != SyncState::Pending {
                return Ok(false);
            }
            photo.sync_state = SyncState::Syncing;
            photo.updated_at = Utc::now();
            self.persist_photo(photo)?;
            return Ok(true);
        }
        Err(StoreError::UnknownRecord { local_id })
    }

    /// Marks a finding as acknowledged by the remote store. Terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is unknown, not `Syncing`, or the
    /// journal write fails.
    pub fn complete_finding(&self, local_id: Uuid, remote_id: impl Into<String>) -> StoreResult<()> {
        let mut finding = self
            .finding(local_id)
            .ok_or(StoreError::UnknownRecord { local_id })?;
        check_syncing(local_id, finding.sync_state)?;

        finding.sync_state = SyncState::Synced;
        finding.remote_id = Some(remote_id.into());
        finding.last_error = None;
        finding.updated_at = Utc::now();
        self.persist_finding(finding)
    }

    /// Marks a photo as uploaded. Terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is unknown, not `Syncing`, or the
    /// journal write fails.
    pub fn complete_photo(&self, local_id: Uuid, remote_url: impl Into<String>) -> StoreResult<()> {
        let mut photo = self
            .photo(local_id)
            .ok_or(StoreError::UnknownRecord { local_id })?;
        check_syncing(local_id, photo.sync_state)?;

        photo.sync_state = SyncState::Synced;
        photo.remote_url = Some(remote_url.into());
        photo.last_error = None;
        photo.updated_at = Utc::now();
        self.persist_photo(photo)
    }

    /// Records a retryable failure for a record that was `Syncing`.
    ///
    /// The retry count is incremented and the record returns to `Pending`,
    /// or moves to `Error` once the count reaches `ceiling`. Returns the
    /// resulting state.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is unknown, not `Syncing`, or the
    /// journal write fails.
    pub fn record_failure(
        &self,
        local_id: Uuid,
        message: impl Into<String>,
        ceiling: u32,
    ) -> StoreResult<SyncState> {
        self.fail_record(local_id, message.into(), Some(ceiling))
    }

    /// Records a permanent rejection: the record moves straight to
    /// `Error` regardless of its retry count.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is unknown, not `Syncing`, or the
    /// journal write fails.
    pub fn record_rejection(&self, local_id: Uuid, message: impl Into<String>) -> StoreResult<()> {
        self.fail_record(local_id, message.into(), None).map(|_| ())
    }

    /// Releases a `Syncing` record back to `Pending` without counting a
    /// retry. Used when a pass aborts on connectivity loss.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is unknown, not `Syncing`, or the
    /// journal write fails.
    pub fn release(&self, local_id: Uuid) -> StoreResult<()> {
        if let Some(mut finding) = self.finding(local_id) {
            check_syncing(local_id, finding.sync_state)?;
            finding.sync_state = SyncState::Pending;
            finding.updated_at = Utc::now();
            return self.persist_finding(finding);
        }
        if let Some(mut photo) = self.photo(local_id) {
            check_syncing(local_id, photo.sync_state)?;
            photo.sync_state = SyncState::Pending;
            photo.updated_at = Utc::now();
            return self.persist_photo(photo);
        }
        Err(StoreError::UnknownRecord { local_id })
    }

    /// Requeues every `Error` record back to `Pending` with a fresh retry
    /// budget. Returns how many records were requeued.
    ///
    /// # Errors
    ///
    /// Returns an error if a journal write fails; records requeued before
    /// the failure stay requeued.
    pub fn retry_errored(&self) -> StoreResult<usize> {
        let mut requeued = 0;

        let errored_findings: Vec<PendingFinding> = self
            .findings
            .read()
            .values()
            .filter(|f| f.sync_state == SyncState::Error)
            .cloned()
            .collect();
        for mut finding in errored_findings {
            finding.sync_state = SyncState::Pending;
            finding.retry_count = 0;
            finding.updated_at = Utc::now();
            self.persist_finding(finding)?;
            requeued += 1;
        }

        let errored_photos: Vec<PendingPhoto> = self
            .photos
            .read()
            .values()
            .filter(|p| p.sync_state == SyncState::Error)
            .cloned()
            .collect();
        for mut photo in errored_photos {
            photo.sync_state = SyncState::Pending;
            photo.retry_count = 0;
            photo.updated_at = Utc::now();
            self.persist_photo(photo)?;
            requeued += 1;
        }

        Ok(requeued)
    }

    // ---- queries ----

    /// Returns a point read of a finding.
    #[must_use]
    pub fn finding(&self, local_id: Uuid) -> Option<PendingFinding> {
        self.findings.read().get(&local_id).cloned()
    }

    /// Returns a point read of a photo.
    #[must_use]
    pub fn photo(&self, local_id: Uuid) -> Option<PendingPhoto> {
        self.photos.read().get(&local_id).cloned()
    }

    /// Every finding not yet `Synced`, in stable order (`updated_at`,
    /// tie-broken by id).
    #[must_use]
    pub fn unsynced_findings(&self) -> Vec<PendingFinding> {
        let mut out: Vec<PendingFinding> = self
            .findings
            .read()
            .values()
            .filter(|f| f.sync_state.is_unsynced())
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.updated_at, a.local_id).cmp(&(b.updated_at, b.local_id)));
        out
    }

    /// Every photo not yet `Synced`, in stable order.
    #[must_use]
    pub fn unsynced_photos(&self) -> Vec<PendingPhoto> {
        let mut out: Vec<PendingPhoto> = self
            .photos
            .read()
            .values()
            .filter(|p| p.sync_state.is_unsynced())
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.updated_at, a.local_id).cmp(&(b.updated_at, b.local_id)));
        out
    }

    /// Findings currently eligible for a sync pass (`Pending` only).
    #[must_use]
    pub fn pending_findings(&self) -> Vec<PendingFinding> {
        let mut out: Vec<PendingFinding> = self
            .findings
            .read()
            .values()
            .filter(|f| f.sync_state == SyncState::Pending)
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.updated_at, a.local_id).cmp(&(b.updated_at, b.local_id)));
        out
    }

    /// Photos currently eligible for a sync pass (`Pending` only).
    #[must_use]
    pub fn pending_photos(&self) -> Vec<PendingPhoto> {
        let mut out: Vec<PendingPhoto> = self
            .photos
            .read()
            .values()
            .filter(|p| p.sync_state == SyncState::Pending)
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.updated_at, a.local_id).cmp(&(b.updated_at, b.local_id)));
        out
    }

    /// Counts of unsynced findings and photos.
    #[must_use]
    pub fn unsynced_counts(&self) -> (usize, usize) {
        let findings = self
            .findings
            .read()
            .values()
            .filter(|f| f.sync_state.is_unsynced())
            .count();
        let photos = self
            .photos
            .read()
            .values()
            .filter(|p| p.sync_state.is_unsynced())
            .count();
        (findings, photos)
    }

    /// Returns true if the given inspection has any unsynced finding or
    /// photo. Used for UI badging of in-progress work.
    #[must_use]
    pub fn inspection_has_unsynced(&self, inspection_id: Uuid) -> bool {
        self.findings
            .read()
            .values()
            .any(|f| f.inspection_id == inspection_id && f.sync_state.is_unsynced())
            || self
                .photos
                .read()
                .values()
                .any(|p| p.inspection_id == inspection_id && p.sync_state.is_unsynced())
    }

    // ---- metadata ----

    /// Reads a metadata value.
    #[must_use]
    pub fn meta(&self, key: &str) -> Option<String> {
        self.meta.read().get(key).cloned()
    }

    /// Writes a metadata value. Durable once this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal write fails.
    pub fn set_meta(&self, key: impl Into<String>, value: impl Into<String>) -> StoreResult<()> {
        let key = key.into();
        let value = value.into();
        self.journal.append(&JournalRecord::Meta {
            key: key.clone(),
            value: value.clone(),
        })?;
        self.meta.write().insert(key, value);
        Ok(())
    }

    /// Returns the timestamp of the last successful full pass, if any.
    #[must_use]
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.meta(META_LAST_SYNC)
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Advances the `last_sync` timestamp. Monotonic: a value older than
    /// the stored one is silently ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal write fails.
    pub fn set_last_sync(&self, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(current) = self.last_sync() {
            if at < current {
                return Ok(());
            }
        }
        self.set_meta(META_LAST_SYNC, at.to_rfc3339())
    }

    // ---- maintenance ----

    /// Rewrites the journal keeping only live state, dropping records that
    /// have fully synced. Unsynced records are never removed.
    ///
    /// The replacement journal is installed atomically; a crash or I/O
    /// failure mid-compaction leaves the old journal (and the in-memory
    /// state) intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewrite fails. Nothing is dropped in that
    /// case.
    pub fn compact(&self) -> StoreResult<()> {
        let mut findings = self.findings.write();
        let mut photos = self.photos.write();
        let meta = self.meta.read();

        let mut records: Vec<JournalRecord> = Vec::new();
        for finding in findings.values().filter(|f| f.sync_state.is_unsynced()) {
            records.push(JournalRecord::Finding(finding.clone()));
        }
        for photo in photos.values().filter(|p| p.sync_state.is_unsynced()) {
            records.push(JournalRecord::Photo(photo.clone()));
        }
        for (key, value) in meta.iter() {
            records.push(JournalRecord::Meta {
                key: key.clone(),
                value: value.clone(),
            });
        }

        self.journal.rewrite(&records)?;

        findings.retain(|_, f| f.sync_state.is_unsynced());
        photos.retain(|_, p| p.sync_state.is_unsynced());
        Ok(())
    }

    /// Returns the current journal size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn journal_size(&self) -> StoreResult<u64> {
        self.journal.size()
    }

    // ---- internals ----

    fn persist_finding(&self, finding: PendingFinding) -> StoreResult<()> {
        self.journal.append(&JournalRecord::Finding(finding.clone()))?;
        self.findings.write().insert(finding.local_id, finding);
        Ok(())
    }

    fn persist_photo(&self, photo: PendingPhoto) -> StoreResult<()> {
        self.journal.append(&JournalRecord::Photo(photo.clone()))?;
        self.photos.write().insert(photo.local_id, photo);
        Ok(())
    }

    fn fail_record(
        &self,
        local_id: Uuid,
        message: String,
        ceiling: Option<u32>,
    ) -> StoreResult<SyncState> {
        if let Some(mut finding) = self.finding(local_id) {
            check_syncing(local_id, finding.sync_state)?;
            finding.retry_count += 1;
            finding.last_error = Some(message);
            finding.sync_state = failed_state(finding.retry_count, ceiling);
            finding.updated_at = Utc::now();
            let state = finding.sync_state;
            self.persist_finding(finding)?;
            return Ok(state);
        }
        if let Some(mut photo) = self.photo(local_id) {
            check_syncing(local_id, photo.sync_state)?;
            photo.retry_count += 1;
            photo.last_error = Some(message);
            photo.sync_state = failed_state(photo.retry_count, ceiling);
            photo.updated_at = Utc::now();
            let state = photo.sync_state;
            self.persist_photo(photo)?;
            return Ok(state);
        }
        Err(StoreError::UnknownRecord { local_id })
    }
}

fn failed_state(retry_count: u32, ceiling: Option<u32>) -> SyncState {
    match ceiling {
        Some(limit) if retry_count < limit => SyncState::Pending,
        _ => SyncState::Error,
    }
}

fn check_editable(local_id: Uuid, state: SyncState) -> StoreResult<()> {
    match state {
        SyncState::Syncing => Err(StoreError::RecordLocked { local_id }),
        SyncState::Synced => Err(StoreError::AlreadySynced { local_id }),
        _ => Ok(()),
    }
}

fn check_syncing(local_id: Uuid, state: SyncState) -> StoreResult<()> {
    if state == SyncState::Syncing {
        Ok(())
    } else {
        Err(StoreError::InvalidState {
            local_id,
            state,
            expected: SyncState::Syncing,
        })
    }
}

fn is_newer_timestamp(meta: &HashMap<String, String>, candidate: &str) -> bool {
    let Some(current) = meta.get(META_LAST_SYNC) else {
        return true;
    };
    match (
        DateTime::parse_from_rfc3339(current),
        DateTime::parse_from_rfc3339(candidate),
    ) {
        (Ok(cur), Ok(cand)) => cand >= cur,
        _ => true,
    }
}
