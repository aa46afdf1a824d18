//! The sync executor: one pass over the pending queue.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;
use chrono::Utc;
use fieldsync_store::LocalStore;
use tracing::{debug, warn};

/// Result of a single sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Findings acknowledged by the remote store during this pass.
    pub findings_synced: usize,
    /// Photos uploaded during this pass.
    pub photos_uploaded: usize,
    /// One human-readable message per failed record (or a single
    /// pass-level message when the store itself failed).
    pub errors: Vec<String>,
    /// True if connectivity loss aborted the pass before the queue was
    /// drained. Progress made before the abort is preserved.
    pub aborted: bool,
}

impl SyncReport {
    /// Returns true if nothing went wrong during the pass.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && !self.aborted
    }
}

/// Runs one sync pass. The caller must hold the orchestrator's sync flag.
///
/// Snapshots the pending findings and photos, then upserts each record to
/// the remote store under the configured per-call timeout. Record-level
/// failures are recorded and do not stop the pass; a connectivity-class
/// failure aborts the remaining records of both streams, releasing the
/// in-flight record without charging a retry. `last_sync` advances only
/// when the pass ran to completion.
///
/// # Errors
///
/// Returns an error only for store failures; every remote failure is
/// captured in the report.
pub(crate) async fn run_pass(
    store: &LocalStore,
    remote: &dyn RemoteStore,
    config: &SyncConfig,
) -> SyncResult<SyncReport> {
    let findings = store.pending_findings();
    let photos = store.pending_photos();
    debug!(
        findings = findings.len(),
        photos = photos.len(),
        "starting sync pass"
    );

    let mut report = SyncReport::default();

    for snapshot in findings {
        if report.aborted {
            break;
        }
        if !store.begin_sync(snapshot.local_id)? {
            continue;
        }
        // Re-read after taking the lock so an edit that landed between
        // the snapshot and begin_sync is what gets uploaded.
        let Some(finding) = store.finding(snapshot.local_id) else {
            continue;
        };

        let result = with_timeout(config, remote.upsert_finding(&finding)).await;
        match result {
            Ok(ack) => {
                store.complete_finding(finding.local_id, ack.remote_id)?;
                report.findings_synced += 1;
            }
            Err(e) => handle_failure(store, &mut report, finding.local_id, "finding", e, config)?,
        }
    }

    for snapshot in photos {
        if report.aborted {
            break;
        }
        if !store.begin_sync(snapshot.local_id)? {
            continue;
        }
        let Some(photo) = store.photo(snapshot.local_id) else {
            continue;
        };

        let result = with_timeout(config, remote.upload_photo(&photo)).await;
        match result {
            Ok(ack) => {
                store.complete_photo(photo.local_id, ack.remote_url)?;
                report.photos_uploaded += 1;
            }
            Err(e) => handle_failure(store, &mut report, photo.local_id, "photo", e, config)?,
        }
    }

    if report.aborted {
        warn!(
            synced = report.findings_synced,
            uploaded = report.photos_uploaded,
            "sync pass aborted by connectivity loss"
        );
    } else {
        store.set_last_sync(Utc::now())?;
        debug!(
            synced = report.findings_synced,
            uploaded = report.photos_uploaded,
            errors = report.errors.len(),
            "sync pass complete"
        );
    }

    Ok(report)
}

async fn with_timeout<T>(
    config: &SyncConfig,
    call: impl std::future::Future<Output = SyncResult<T>>,
) -> SyncResult<T> {
    match tokio::time::timeout(config.request_timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout),
    }
}

fn handle_failure(
    store: &LocalStore,
    report: &mut SyncReport,
    local_id: uuid::Uuid,
    kind: &str,
    error: SyncError,
    config: &SyncConfig,
) -> SyncResult<()> {
    report.errors.push(format!("{kind} {local_id}: {error}"));

    if error.is_connectivity() {
        // The record never reached the remote; put it back untouched and
        // stop making calls for this pass.
        store.release(local_id)?;
        report.aborted = true;
        return Ok(());
    }

    if error.is_retryable() {
        store.record_failure(local_id, error.to_string(), config.retry_ceiling)?;
    } else {
        store.record_rejection(local_id, error.to_string())?;
    }
    Ok(())
}
