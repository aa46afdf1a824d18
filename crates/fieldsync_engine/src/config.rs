//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Timeout applied to each individual remote call.
    pub request_timeout: Duration,
    /// Maximum failed attempts per record before it is parked in the
    /// `Error` state. Bounded by design; there is no "retry forever".
    pub retry_ceiling: u32,
    /// Interval of the periodic poll task.
    pub poll_interval: Duration,
    /// Debounce window applied to reconnect edges, so a burst of
    /// offline/online flaps collapses into a single pass.
    pub reconnect_debounce: Duration,
    /// Whether the periodic poll re-triggers a pass when records are
    /// pending and the network is up. When false the poll only refreshes
    /// status.
    pub poll_triggers_sync: bool,
}

impl SyncConfig {
    /// Creates a configuration with the default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            retry_ceiling: 5,
            poll_interval: Duration::from_secs(15),
            reconnect_debounce: Duration::from_millis(500),
            poll_triggers_sync: true,
        }
    }

    /// Sets the per-call request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the per-record retry ceiling.
    #[must_use]
    pub fn with_retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = ceiling;
        self
    }

    /// Sets the periodic poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the reconnect debounce window.
    #[must_use]
    pub fn with_reconnect_debounce(mut self, debounce: Duration) -> Self {
        self.reconnect_debounce = debounce;
        self
    }

    /// Sets whether the periodic poll re-triggers sync.
    #[must_use]
    pub fn with_poll_triggers_sync(mut self, enabled: bool) -> Self {
        self.poll_triggers_sync = enabled;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
