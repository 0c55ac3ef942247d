//! Error types for the delta flusher.

use std::io;
use thiserror::Error;

/// Result type for flusher operations.
pub type FlushResult<T> = Result<T, FlushError>;

/// Failures reported by the external collaborators: the transition, the
/// flush, and the host sync sweep.
#[derive(Debug, Error)]
pub enum BackendError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The delta transition failed.
    #[error("delta transition failed: {message}")]
    Transition {
        /// Description of the failure.
        message: String,
    },

    /// Writing out the staged delta failed.
    #[error("delta flush failed: {message}")]
    Flush {
        /// Description of the failure.
        message: String,
    },

    /// The host's per-file sync sweep failed.
    #[error("host sync failed: {message}")]
    HostSync {
        /// Description of the failure.
        message: String,
    },
}

impl BackendError {
    /// Creates a transition failure.
    pub fn transition(message: impl Into<String>) -> Self {
        Self::Transition {
            message: message.into(),
        }
    }

    /// Creates a flush failure.
    pub fn flush(message: impl Into<String>) -> Self {
        Self::Flush {
            message: message.into(),
        }
    }

    /// Creates a host sync failure.
    pub fn host_sync(message: impl Into<String>) -> Self {
        Self::HostSync {
            message: message.into(),
        }
    }
}

/// Errors returned by the coordinator.
#[derive(Debug, Error)]
pub enum FlushError {
    /// A blocking wait was cancelled, or its deadline passed, before its
    /// condition held. No progress is implied.
    #[error("wait interrupted before the target delta was reached")]
    Interrupted,

    /// An external operation failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The flusher configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl FlushError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if this error is an interrupted wait.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}
