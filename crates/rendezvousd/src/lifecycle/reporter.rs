//! Observer surfacing orchestration milestones and degradations.

use std::path::Path;
use std::sync::Arc;

use crate::discovery::Removal;
use crate::lock::LockError;
use crate::process::InterruptError;
use crate::server::ShutdownCause;
use crate::watch::WatchError;

use super::LIFECYCLE_TARGET;

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait LifecycleReporter: Send + Sync {
    /// A live server was already published. `after_upgrade` is set when the
    /// record appeared while this process waited for the exclusive lock.
    fn existing_server(&self, path: &Path, endpoint: &str, after_upgrade: bool);

    /// A published endpoint failed the liveness probe.
    fn stale_record(&self, path: &Path, endpoint: &str);

    /// The discovery file could not be read and was treated as empty.
    fn record_unreadable(&self, path: &Path, error: &LockError);

    /// This process started a server and published its endpoint.
    fn server_published(&self, path: &Path, endpoint: &str);

    /// A server was started without any discovery file.
    fn foreground_started(&self, endpoint: &str);

    /// Publishing failed and the fresh server is being shut down again.
    fn compensating_shutdown(&self, endpoint: &str, error: &LockError);

    /// Removal watching is unavailable; only inactivity and explicit calls
    /// will stop the server.
    fn watch_unavailable(&self, path: &Path, error: &WatchError);

    /// Interrupt handling could not be installed.
    fn interrupt_unavailable(&self, error: &InterruptError);

    /// The owned server stopped. `removal` is `None` in foreground mode.
    fn shutdown_completed(&self, endpoint: &str, cause: ShutdownCause, removal: Option<&Removal>);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn existing_server(&self, path: &Path, endpoint: &str, after_upgrade: bool) {
        (**self).existing_server(path, endpoint, after_upgrade);
    }

    fn stale_record(&self, path: &Path, endpoint: &str) {
        (**self).stale_record(path, endpoint);
    }

    fn record_unreadable(&self, path: &Path, error: &LockError) {
        (**self).record_unreadable(path, error);
    }

    fn server_published(&self, path: &Path, endpoint: &str) {
        (**self).server_published(path, endpoint);
    }

    fn foreground_started(&self, endpoint: &str) {
        (**self).foreground_started(endpoint);
    }

    fn compensating_shutdown(&self, endpoint: &str, error: &LockError) {
        (**self).compensating_shutdown(endpoint, error);
    }

    fn watch_unavailable(&self, path: &Path, error: &WatchError) {
        (**self).watch_unavailable(path, error);
    }

    fn interrupt_unavailable(&self, error: &InterruptError) {
        (**self).interrupt_unavailable(error);
    }

    fn shutdown_completed(&self, endpoint: &str, cause: ShutdownCause, removal: Option<&Removal>) {
        (**self).shutdown_completed(endpoint, cause, removal);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredLifecycleReporter;

impl LifecycleReporter for StructuredLifecycleReporter {
    fn existing_server(&self, path: &Path, endpoint: &str, after_upgrade: bool) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "existing_server",
            file = %path.display(),
            endpoint,
            after_upgrade,
            "server already running"
        );
    }

    fn stale_record(&self, path: &Path, endpoint: &str) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "stale_record",
            file = %path.display(),
            endpoint,
            "published endpoint is not answering"
        );
    }

    fn record_unreadable(&self, path: &Path, error: &LockError) {
        tracing::warn!(
            target: LIFECYCLE_TARGET,
            event = "record_unreadable",
            file = %path.display(),
            error = %error,
            "discovery file unreadable; treating it as empty"
        );
    }

    fn server_published(&self, path: &Path, endpoint: &str) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "server_published",
            file = %path.display(),
            endpoint,
            "server started and published"
        );
    }

    fn foreground_started(&self, endpoint: &str) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "foreground_started",
            endpoint,
            "server started without a discovery file"
        );
    }

    fn compensating_shutdown(&self, endpoint: &str, error: &LockError) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "compensating_shutdown",
            endpoint,
            error = %error,
            "publishing failed; stopping the unreachable server"
        );
    }

    fn watch_unavailable(&self, path: &Path, error: &WatchError) {
        tracing::warn!(
            target: LIFECYCLE_TARGET,
            event = "watch_unavailable",
            file = %path.display(),
            error = %error,
            "will not shut down when the discovery file is removed; only on inactivity"
        );
    }

    fn interrupt_unavailable(&self, error: &InterruptError) {
        tracing::warn!(
            target: LIFECYCLE_TARGET,
            event = "interrupt_unavailable",
            error = %error,
            "interrupts will not clean up the discovery file"
        );
    }

    fn shutdown_completed(&self, endpoint: &str, cause: ShutdownCause, removal: Option<&Removal>) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "shutdown_completed",
            endpoint,
            %cause,
            removal = ?removal,
            "server shut down"
        );
    }
}
