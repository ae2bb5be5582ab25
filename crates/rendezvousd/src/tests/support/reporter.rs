//! Test double for [`LifecycleReporter`] that records events for assertions.

use std::path::Path;
use std::sync::Mutex;

use crate::discovery::Removal;
use crate::lifecycle::LifecycleReporter;
use crate::lock::LockError;
use crate::process::InterruptError;
use crate::server::ShutdownCause;
use crate::watch::WatchError;

/// Lifecycle events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    ExistingServer { endpoint: String, after_upgrade: bool },
    StaleRecord(String),
    RecordUnreadable,
    ServerPublished(String),
    ForegroundStarted(String),
    CompensatingShutdown(String),
    WatchUnavailable,
    InterruptUnavailable,
    ShutdownCompleted {
        cause: ShutdownCause,
        removal: Option<Removal>,
    },
}

/// Records lifecycle events for assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .expect("lifecycle reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .expect("lifecycle reporter mutex poisoned")
            .push(event);
    }
}

impl LifecycleReporter for RecordingReporter {
    fn existing_server(&self, _path: &Path, endpoint: &str, after_upgrade: bool) {
        self.record(LifecycleEvent::ExistingServer {
            endpoint: endpoint.to_owned(),
            after_upgrade,
        });
    }

    fn stale_record(&self, _path: &Path, endpoint: &str) {
        self.record(LifecycleEvent::StaleRecord(endpoint.to_owned()));
    }

    fn record_unreadable(&self, _path: &Path, _error: &LockError) {
        self.record(LifecycleEvent::RecordUnreadable);
    }

    fn server_published(&self, _path: &Path, endpoint: &str) {
        self.record(LifecycleEvent::ServerPublished(endpoint.to_owned()));
    }

    fn foreground_started(&self, endpoint: &str) {
        self.record(LifecycleEvent::ForegroundStarted(endpoint.to_owned()));
    }

    fn compensating_shutdown(&self, endpoint: &str, _error: &LockError) {
        self.record(LifecycleEvent::CompensatingShutdown(endpoint.to_owned()));
    }

    fn watch_unavailable(&self, _path: &Path, _error: &WatchError) {
        self.record(LifecycleEvent::WatchUnavailable);
    }

    fn interrupt_unavailable(&self, _error: &InterruptError) {
        self.record(LifecycleEvent::InterruptUnavailable);
    }

    fn shutdown_completed(&self, _endpoint: &str, cause: ShutdownCause, removal: Option<&Removal>) {
        self.record(LifecycleEvent::ShutdownCompleted {
            cause,
            removal: removal.cloned(),
        });
    }
}
