//! Detaches `rendezvousd` into the background before it coordinates.

use std::ffi::OsStr;
use std::path::Path;

use daemonize_me::Daemon;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// Abstraction over daemonisation strategies.
pub trait Daemonizer: Send + Sync {
    /// Detaches the process, keeping `work_dir` as its working directory.
    fn daemonize(&self, work_dir: &Path) -> Result<(), DaemonizeError>;
}

/// Errors surfaced by the daemonisation backend.
#[derive(Debug, Error)]
pub enum DaemonizeError {
    /// System-level daemonisation failed.
    #[error("{0}")]
    System(#[from] daemonize_me::DaemonError),
}

/// Daemoniser that delegates to `daemonize-me`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDaemonizer;

impl Daemonizer for SystemDaemonizer {
    fn daemonize(&self, work_dir: &Path) -> Result<(), DaemonizeError> {
        info!(
            target: PROCESS_TARGET,
            work_dir = %work_dir.display(),
            "detaching into background"
        );
        Daemon::new()
            .work_dir(work_dir)
            .name(OsStr::new(env!("CARGO_PKG_NAME")))
            .start()?;
        info!(
            target: PROCESS_TARGET,
            pid = std::process::id(),
            "detached; continuing in child"
        );
        Ok(())
    }
}
