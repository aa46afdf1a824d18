//! Read-only sync status derivation.

use chrono::{DateTime, Utc};
use fieldsync_store::LocalStore;

/// A snapshot of the engine's externally visible state, consumed by UI.
///
/// Always derived fresh from the durable store plus the orchestrator
/// flags; nothing here is an independently maintained counter, so the
/// numbers cannot drift from what is actually on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Current connectivity state.
    pub is_online: bool,
    /// Whether a sync pass is running right now.
    pub is_syncing: bool,
    /// Timestamp of the last pass that ran to completion.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Unsynced findings plus unsynced photos.
    pub pending_changes: usize,
}

pub(crate) fn derive(store: &LocalStore, is_online: bool, is_syncing: bool) -> SyncStatus {
    let (findings, photos) = store.unsynced_counts();
    SyncStatus {
        is_online,
        is_syncing,
        last_synced_at: store.last_sync(),
        pending_changes: findings + photos,
    }
}
