//! Connectivity signal and platform background-sync capabilities.

use crate::error::SyncResult;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;

/// The platform's online/offline signal, as an injectable capability.
///
/// The monitor holds a single boolean behind a watch channel. Platform
/// glue (or a test) drives it with [`set_online`]; observers read the
/// current state or subscribe to transition edges. Setting the same value
/// twice fires no edge, so observers only ever see real transitions.
///
/// [`set_online`]: ConnectivityMonitor::set_online
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with the given initial state.
    #[must_use]
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx: Arc::new(tx) }
    }

    /// Returns the current connectivity state.
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Drives the signal. No-op (no edge fired) if the state is unchanged.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|state| {
            if *state == online {
                false
            } else {
                *state = online;
                true
            }
        });
    }

    /// Subscribes to transition edges.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

/// A task handed to the platform's background-sync facility.
pub type BackgroundTask =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// The platform's background-task registration API, as an injectable
/// capability. The platform may invoke the registered task whenever it
/// sees fit (typically when connectivity returns while the app is not
/// foregrounded).
pub trait BackgroundScheduler: Send + Sync {
    /// Registers the task. Called once at startup.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the registration.
    fn register(&self, task: BackgroundTask) -> SyncResult<()>;
}

/// A scheduler for platforms without a background-sync facility.
/// Registration succeeds and the task is never invoked.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScheduler;

impl BackgroundScheduler for NoopScheduler {
    fn register(&self, _task: BackgroundTask) -> SyncResult<()> {
        Ok(())
    }
}
