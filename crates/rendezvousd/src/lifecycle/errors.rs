//! Error surface of the find-or-start protocol.

use std::path::PathBuf;

use thiserror::Error;

use crate::lock::LockError;
use crate::server::StartError;

/// Fatal orchestration failures. Losing the ownership race is not an error.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Opening the discovery file or taking the shared lock failed.
    #[error("failed to acquire read lock: {source}")]
    AcquireRead {
        /// Underlying lock error.
        #[source]
        source: LockError,
    },
    /// Upgrading to the exclusive lock failed.
    #[error("failed to acquire write lock: {source}")]
    UpgradeExclusive {
        /// Underlying lock error.
        #[source]
        source: LockError,
    },
    /// The lock was not in a state that allows reading the record.
    #[error("failed to read discovery record: {source}")]
    ReadRecord {
        /// Underlying lock error.
        #[source]
        source: LockError,
    },
    /// The server could not be started; nothing was published.
    #[error("failed to start server: {source}")]
    Start {
        /// Underlying start error.
        #[source]
        source: StartError,
    },
    /// Writing the endpoint failed; the fresh server was shut down again.
    #[error("failed to publish endpoint to '{path}': {source}")]
    Publish {
        /// Discovery file path.
        path: PathBuf,
        /// Underlying lock error.
        #[source]
        source: LockError,
    },
    /// Removing the discovery file after shutdown failed.
    #[error("failed to remove discovery file '{path}': {source}")]
    Cleanup {
        /// Discovery file path.
        path: PathBuf,
        /// Underlying lock error.
        #[source]
        source: LockError,
    },
}
