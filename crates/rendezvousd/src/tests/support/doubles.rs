//! Collaborator doubles injected into the orchestrator and launcher.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};

use rendezvous_config::ServerConfig;

use crate::process::{
    DaemonizeError, Daemonizer, InterruptCallback, InterruptError, InterruptHook,
};
use crate::server::{BackgroundServer, ServerLauncher, StartError, SystemLauncher};
use crate::watch::{RemovalCallback, RemovalWatcher, Subscription, WatchError};

/// Launcher that starts real servers and counts how many it started.
#[derive(Clone, Default)]
pub struct CountingLauncher {
    inner: SystemLauncher,
    starts: Arc<AtomicUsize>,
}

impl CountingLauncher {
    /// Number of servers started so far, across clones.
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

impl ServerLauncher for CountingLauncher {
    fn start(&self, config: &ServerConfig) -> Result<BackgroundServer, StartError> {
        let server = self.inner.start(config)?;
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(server)
    }
}

/// Launcher whose every start fails as if the port were taken.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingLauncher;

impl ServerLauncher for FailingLauncher {
    fn start(&self, _config: &ServerConfig) -> Result<BackgroundServer, StartError> {
        Err(StartError::Bind {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        })
    }
}

/// Interrupt hook that never fires, keeping the test process' signals alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertInterruptHook;

impl InterruptHook for InertInterruptHook {
    fn install(&self, _on_interrupt: InterruptCallback) -> Result<Subscription, InterruptError> {
        Ok(Subscription::none())
    }
}

/// Interrupt hook that keeps the callback so a test can deliver the
/// interrupt itself.
#[derive(Clone, Default)]
pub struct ManualInterruptHook {
    pending: Arc<Mutex<Option<InterruptCallback>>>,
}

impl ManualInterruptHook {
    /// Runs the installed callback. Returns `false` when none is pending.
    pub fn interrupt(&self) -> bool {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        pending.map(|on_interrupt| on_interrupt()).is_some()
    }
}

impl InterruptHook for ManualInterruptHook {
    fn install(&self, on_interrupt: InterruptCallback) -> Result<Subscription, InterruptError> {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(on_interrupt);
        Ok(Subscription::none())
    }
}

/// Watcher that reports the capability as missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableWatcher;

impl RemovalWatcher for UnavailableWatcher {
    fn watch(&self, path: &Path, _on_removed: RemovalCallback) -> Result<Subscription, WatchError> {
        Err(WatchError::Unavailable {
            path: PathBuf::from(path),
            source: notify::Error::generic("watching disabled"),
        })
    }
}

/// Daemoniser that only counts invocations.
#[derive(Debug, Default, Clone)]
pub struct RecordingDaemonizer {
    calls: Arc<AtomicUsize>,
}

impl RecordingDaemonizer {
    /// Number of daemonisation requests.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Daemonizer for RecordingDaemonizer {
    fn daemonize(&self, _work_dir: &Path) -> Result<(), DaemonizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
