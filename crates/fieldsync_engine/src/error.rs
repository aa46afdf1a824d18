//! Error types for the sync engine.

use fieldsync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote store failed or rejected a record.
    #[error("remote error: {message}")]
    Remote {
        /// Human-readable error message.
        message: String,
        /// Whether the record can be retried on a later pass.
        retryable: bool,
    },

    /// The network is unreachable.
    #[error("network unavailable")]
    Offline,

    /// A remote call exceeded the configured timeout.
    #[error("remote call timed out")]
    Timeout,

    /// The durable store failed. Fatal for the current pass.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Background sync was already registered for this orchestrator.
    #[error("background sync already registered")]
    BackgroundAlreadyRegistered,
}

impl SyncError {
    /// Creates a retryable remote error (transient failure).
    pub fn remote_transient(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable remote error (permanent rejection).
    pub fn remote_rejected(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the failed record may be retried on a later pass.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote { retryable, .. } => *retryable,
            SyncError::Offline | SyncError::Timeout => true,
            _ => false,
        }
    }

    /// Returns true if this failure means connectivity is gone, which
    /// aborts the remainder of the current pass.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, SyncError::Offline | SyncError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(SyncError::remote_transient("503").is_retryable());
        assert!(!SyncError::remote_rejected("validation failed").is_retryable());
        assert!(SyncError::Offline.is_retryable());
        assert!(SyncError::Timeout.is_retryable());

        assert!(SyncError::Offline.is_connectivity());
        assert!(SyncError::Timeout.is_connectivity());
        assert!(!SyncError::remote_transient("503").is_connectivity());
    }

    #[test]
    fn display() {
        let err = SyncError::remote_rejected("photo too large");
        assert_eq!(err.to_string(), "remote error: photo too large");
        assert_eq!(SyncError::Offline.to_string(), "network unavailable");
    }
}
