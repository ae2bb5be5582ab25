//! Error surface for advisory lock operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::LockMode;

/// Errors reported while acquiring or using an advisory lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// The context deadline expired before the lock became available.
    #[error("timed out after {waited_ms} ms waiting for {mode} lock on '{path}'")]
    Timeout {
        /// Lock file path.
        path: PathBuf,
        /// Requested lock level.
        mode: LockMode,
        /// Time spent waiting.
        waited_ms: u64,
    },
    /// The context was cancelled before the lock became available.
    #[error("cancelled while waiting for {mode} lock on '{path}'")]
    Cancelled {
        /// Lock file path.
        path: PathBuf,
        /// Requested lock level.
        mode: LockMode,
    },
    /// A filesystem operation on the lock file failed.
    #[error("failed to {operation} lock file '{path}': {source}")]
    Io {
        /// Lock file path.
        path: PathBuf,
        /// Operation that failed.
        operation: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The lock file was removed while waiting and may not be recreated.
    #[error("lock file '{path}' was removed while waiting for the lock")]
    Vanished {
        /// Lock file path.
        path: PathBuf,
    },
    /// The content was accessed without holding the required lock level.
    #[error("'{path}' requires a {required} lock for this operation")]
    NotHeld {
        /// Lock file path.
        path: PathBuf,
        /// Lock level the operation requires.
        required: LockMode,
    },
}

impl LockError {
    pub(crate) fn io(path: PathBuf, operation: &'static str, source: io::Error) -> Self {
        Self::Io {
            path,
            operation,
            source,
        }
    }

    /// Returns `true` when the error came from the context deadline or token.
    #[must_use]
    pub fn is_context_failure(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Cancelled { .. })
    }
}
