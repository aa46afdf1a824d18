//! The sync orchestrator: serializes passes from every trigger source.

use crate::config::SyncConfig;
use crate::connectivity::{BackgroundScheduler, BackgroundTask, ConnectivityMonitor};
use crate::error::{SyncError, SyncResult};
use crate::executor::{run_pass, SyncReport};
use crate::remote::RemoteStore;
use crate::status::{self, SyncStatus};
use fieldsync_store::LocalStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of a sync trigger.
#[derive(Debug)]
pub enum SyncOutcome {
    /// A pass ran; here is what happened.
    Completed(SyncReport),
    /// A pass was already running. The trigger was suppressed; nothing
    /// was queued. Re-trigger after completion if a second pass is
    /// needed.
    AlreadySyncing,
}

impl SyncOutcome {
    /// Returns the report if a pass actually ran.
    #[must_use]
    pub fn report(self) -> Option<SyncReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::AlreadySyncing => None,
        }
    }

    /// Returns true if the trigger was suppressed.
    #[must_use]
    pub fn was_suppressed(&self) -> bool {
        matches!(self, Self::AlreadySyncing)
    }
}

/// Serializes and schedules sync passes.
///
/// One orchestrator exists per store; there is no hidden global state.
/// Construct it, wrap it in an [`Arc`], call [`start`] to spawn the
/// reconnect and poll tasks, and [`shutdown`] when done. All four trigger
/// sources funnel into [`sync_now`], which admits at most one pass at a
/// time through a compare-exchange flag.
///
/// [`start`]: SyncOrchestrator::start
/// [`shutdown`]: SyncOrchestrator::shutdown
/// [`sync_now`]: SyncOrchestrator::sync_now
pub struct SyncOrchestrator {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
    connectivity: ConnectivityMonitor,
    config: SyncConfig,
    syncing: AtomicBool,
    background_registered: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Releases the sync flag when a pass ends, however it ends.
struct SyncFlagGuard<'a>(&'a AtomicBool);

impl Drop for SyncFlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncOrchestrator {
    /// Creates an orchestrator over the given collaborators.
    pub fn new(
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: ConnectivityMonitor,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            config,
            syncing: AtomicBool::new(false),
            background_registered: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Starts the reconnect and poll trigger tasks. Idempotent.
    ///
    /// Reads the persisted `last_sync` and unsynced counts before any
    /// trigger can fire, so status queries are correct from the first
    /// moment.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        let (findings, photos) = self.store.unsynced_counts();
        info!(
            pending_findings = findings,
            pending_photos = photos,
            last_sync = ?self.store.last_sync(),
            "sync orchestrator starting"
        );

        tasks.push(self.spawn_reconnect_task());
        tasks.push(self.spawn_poll_task());
    }

    /// Stops the trigger tasks. Safe to call more than once. A pass that
    /// is mid-flight finishes on its own and releases the flag.
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Runs a sync pass now, unless one is already running.
    ///
    /// This is the single entry point for every trigger source. A trigger
    /// that arrives mid-pass gets [`SyncOutcome::AlreadySyncing`] and
    /// causes no remote calls. Store failures do not escape: they come
    /// back as a completed report with zero progress and one descriptive
    /// error.
    pub async fn sync_now(&self) -> SyncOutcome {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("sync trigger suppressed, pass already running");
            return SyncOutcome::AlreadySyncing;
        }
        let _guard = SyncFlagGuard(&self.syncing);

        match run_pass(self.store.as_ref(), self.remote.as_ref(), &self.config).await {
            Ok(report) => SyncOutcome::Completed(report),
            Err(e) => {
                warn!(error = %e, "sync pass failed before reaching the remote");
                SyncOutcome::Completed(SyncReport {
                    errors: vec![format!("sync pass failed: {e}")],
                    aborted: true,
                    ..Default::default()
                })
            }
        }
    }

    /// Registers a background-sync task with the platform scheduler.
    /// One-time startup call.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::BackgroundAlreadyRegistered`] on a second
    /// call, or the scheduler's error if registration fails.
    pub fn register_background_sync(
        self: &Arc<Self>,
        scheduler: &dyn BackgroundScheduler,
    ) -> SyncResult<()> {
        if self.background_registered.swap(true, Ordering::SeqCst) {
            return Err(SyncError::BackgroundAlreadyRegistered);
        }

        let weak = Arc::downgrade(self);
        let task: BackgroundTask = Arc::new(move || {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(this) = weak.upgrade() {
                    let _ = this.sync_now().await;
                }
            })
        });

        let result = scheduler.register(task);
        if result.is_err() {
            self.background_registered.store(false, Ordering::SeqCst);
        }
        result
    }

    /// Returns a fresh status snapshot derived from the store.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        status::derive(
            self.store.as_ref(),
            self.connectivity.is_online(),
            self.syncing.load(Ordering::SeqCst),
        )
    }

    /// Returns true if a pass is running right now.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    /// Returns true if the given inspection still has unsynced work.
    #[must_use]
    pub fn inspection_has_pending(&self, inspection_id: Uuid) -> bool {
        self.store.inspection_has_unsynced(inspection_id)
    }

    /// The durable store behind this orchestrator.
    #[must_use]
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// The connectivity monitor driving the reconnect trigger.
    #[must_use]
    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    fn spawn_reconnect_task(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let mut rx = self.connectivity.subscribe();
        let debounce = self.config.reconnect_debounce;

        tokio::spawn(async move {
            loop {
                if rx.changed().await.is_err() {
                    break;
                }
                // The monitor only notifies on real transitions, so a
                // `true` here is an offline-to-online edge.
                if !*rx.borrow_and_update() {
                    continue;
                }

                tokio::time::sleep(debounce).await;
                if !*rx.borrow_and_update() {
                    // Flapped back offline inside the debounce window.
                    continue;
                }

                let Some(this) = weak.upgrade() else {
                    break;
                };
                debug!("reconnect detected, triggering sync");
                let _ = this.sync_now().await;
            }
        })
    }

    fn spawn_poll_task(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let interval = self.config.poll_interval;
        let triggers_sync = self.config.poll_triggers_sync;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so startup is not
            // also an implicit trigger.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(this) = weak.upgrade() else {
                    break;
                };

                let status = this.status();
                debug!(
                    pending = status.pending_changes,
                    online = status.is_online,
                    "periodic poll"
                );
                if triggers_sync && status.is_online && status.pending_changes > 0 {
                    let _ = this.sync_now().await;
                }
            }
        })
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
