//! Discovery file holding the endpoint of the published server.
//!
//! The file doubles as the advisory lock: its content is only read under a
//! shared hold and only written under an exclusive one. An empty or missing
//! file means no server is published.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info};

use crate::lock::{AdvisoryLock, LockContext, LockError};

const DISCOVERY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::discovery");

/// Logical content of the discovery file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryRecord {
    endpoint: Option<String>,
}

impl DiscoveryRecord {
    /// Record announcing no server.
    #[must_use]
    pub const fn empty() -> Self {
        Self { endpoint: None }
    }

    /// Record announcing `endpoint`.
    #[must_use]
    pub fn published(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            endpoint: (!endpoint.trim().is_empty()).then_some(endpoint),
        }
    }

    /// Decodes raw file content. Surrounding whitespace is ignored and
    /// undecodable bytes are kept lossily so the probe can reject them.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::published(String::from_utf8_lossy(bytes).trim())
    }

    /// Published endpoint, if any.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Whether the record announces no server.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.endpoint.is_none()
    }

    /// Encodes the record as file content, without a trailing newline.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.endpoint
            .as_deref()
            .map(|endpoint| endpoint.as_bytes().to_vec())
            .unwrap_or_default()
    }
}

/// Reads the record through a lock held at least in shared mode.
pub fn read_record(lock: &mut AdvisoryLock) -> Result<DiscoveryRecord, LockError> {
    lock.read_bytes().map(|bytes| DiscoveryRecord::from_bytes(&bytes))
}

/// Overwrites the record through a lock held in exclusive mode.
pub fn publish_record(lock: &mut AdvisoryLock, record: &DiscoveryRecord) -> Result<(), LockError> {
    lock.write_bytes(&record.to_bytes())?;
    info!(
        target: DISCOVERY_TARGET,
        file = %lock.path().display(),
        endpoint = record.endpoint().unwrap_or_default(),
        "discovery record published"
    );
    Ok(())
}

/// Result of a best-effort removal of the discovery file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// The file held our endpoint and was deleted.
    Removed,
    /// The file was already gone.
    AlreadyRemoved,
    /// The file now names another endpoint (or none) and was left alone.
    NotOwned {
        /// Endpoint currently recorded, if any.
        current: Option<String>,
    },
}

/// Deletes the discovery file when it still names `endpoint`.
///
/// A missing file counts as success because removal is often what triggered
/// the shutdown in the first place. The file is never recreated.
pub fn remove_if_owned(
    path: &Path,
    endpoint: &str,
    context: &LockContext,
) -> Result<Removal, LockError> {
    let Some(mut lock) = AdvisoryLock::open_existing(path)? else {
        debug!(
            target: DISCOVERY_TARGET,
            file = %path.display(),
            "discovery file already removed"
        );
        return Ok(Removal::AlreadyRemoved);
    };
    match lock.acquire_exclusive(context) {
        Ok(()) => {}
        Err(LockError::Vanished { .. }) => {
            debug!(
                target: DISCOVERY_TARGET,
                file = %path.display(),
                "discovery file removed while waiting"
            );
            return Ok(Removal::AlreadyRemoved);
        }
        Err(error) => return Err(error),
    }
    let record = read_record(&mut lock)?;
    if record.endpoint() != Some(endpoint) {
        debug!(
            target: DISCOVERY_TARGET,
            file = %path.display(),
            current = record.endpoint().unwrap_or_default(),
            "discovery file names another server; leaving it in place"
        );
        return Ok(Removal::NotOwned {
            current: record.endpoint().map(str::to_owned),
        });
    }
    match fs::remove_file(path) {
        Ok(()) => {
            info!(
                target: DISCOVERY_TARGET,
                file = %path.display(),
                endpoint,
                "discovery file removed"
            );
            Ok(Removal::Removed)
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Removal::AlreadyRemoved),
        Err(source) => Err(LockError::io(path.to_path_buf(), "remove", source)),
    }
}
