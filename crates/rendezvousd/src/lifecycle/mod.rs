//! Race-safe find-or-start protocol for the shared server.
//!
//! Every process needing the server runs the same [`Orchestrator`]. The
//! first one to win the exclusive lock starts a server and publishes its
//! endpoint; all others find that endpoint and use it.
//!
//! The protocol is a double-checked lock over the discovery file:
//!
//! 1. Take the shared lock and read the record.
//! 2. If the record names an endpoint that answers the probe, return it.
//! 3. Upgrade to the exclusive lock.
//! 4. Read and probe again, since another process may have published while
//!    this one waited. Return the endpoint if it answers now.
//! 5. Start a server. On failure nothing is written.
//! 6. Publish the endpoint. On failure the fresh server is stopped again so
//!    it cannot linger unreachable.
//! 7. Release the lock.
//! 8. Install the interrupt hook and removal watcher, best effort.
//!
//! [`OwnedServer::wait`] then blocks until shutdown and removes the record
//! when it still names this server.

mod errors;
mod reporter;

use std::path::{Path, PathBuf};
use std::time::Duration;

use rendezvous_config::{Endpoint, ServerConfig};
use tracing::warn;

use crate::discovery::{self, DiscoveryRecord, Removal};
use crate::lock::{AdvisoryLock, LockContext, LockError};
use crate::probe::{LivenessProbe, SocketProbe};
use crate::process::{InterruptHook, SignalInterruptHook};
use crate::server::{
    BackgroundServer, ServerLauncher, ShutdownCause, ShutdownTrigger, SystemLauncher,
};
use crate::watch::{NotifyRemovalWatcher, RemovalWatcher, Subscription};

pub use self::errors::LifecycleError;
pub use self::reporter::{LifecycleReporter, StructuredLifecycleReporter};

pub(crate) const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Deadline for removing the record once the server has stopped.
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of [`Orchestrator::acquire`].
#[derive(Debug)]
pub enum Acquisition {
    /// A live server is already published at this endpoint.
    Existing(String),
    /// This process owns the server.
    Owned(OwnedServer),
}

/// Result of [`Orchestrator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// This process served until a shutdown cause fired.
    Served {
        /// Endpoint the server listened on.
        endpoint: String,
        /// Cause that stopped it.
        cause: ShutdownCause,
    },
    /// Another process already serves the discovery file.
    AlreadyRunning {
        /// Endpoint of the running server.
        endpoint: String,
    },
}

/// How an owned server ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Cause that stopped the server.
    pub cause: ShutdownCause,
    /// Fate of the discovery file; `None` in foreground mode.
    pub removal: Option<Removal>,
}

impl ShutdownReport {
    /// Whether this process deleted the discovery file itself.
    #[must_use]
    pub fn removed_by_owner(&self) -> bool {
        matches!(self.removal, Some(Removal::Removed))
    }
}

/// A server started and published by this process.
#[derive(Debug)]
pub struct OwnedServer {
    server: BackgroundServer,
    discovery: Option<PathBuf>,
    subscriptions: Vec<Subscription>,
}

impl OwnedServer {
    /// Endpoint of the owned server.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        self.server.endpoint()
    }

    /// Discovery file the endpoint was published to.
    #[must_use]
    pub fn discovery_path(&self) -> Option<&Path> {
        self.discovery.as_deref()
    }

    /// Underlying server handle.
    #[must_use]
    pub const fn server(&self) -> &BackgroundServer {
        &self.server
    }

    /// Requests shutdown. Repeated calls are no-ops.
    pub fn shutdown(&self) {
        self.server.shutdown();
    }

    /// Sender for wiring further shutdown sources.
    #[must_use]
    pub fn trigger(&self) -> ShutdownTrigger {
        self.server.trigger()
    }

    /// Blocks until the server stops, then deletes the discovery file if it
    /// still names this server.
    pub fn wait(self) -> Result<ShutdownReport, LifecycleError> {
        let Self {
            server,
            discovery,
            subscriptions,
        } = self;
        let cause = server.wait_for_shutdown();
        drop(subscriptions);
        let Some(path) = discovery else {
            return Ok(ShutdownReport {
                cause,
                removal: None,
            });
        };
        let endpoint = server.endpoint().to_string();
        let removal = discovery::remove_if_owned(
            &path,
            &endpoint,
            &LockContext::with_timeout(CLEANUP_TIMEOUT),
        )
        .map_err(|source| LifecycleError::Cleanup {
            path: path.clone(),
            source,
        })?;
        Ok(ShutdownReport {
            cause,
            removal: Some(removal),
        })
    }
}

/// Runs the find-or-start protocol with injected collaborators.
#[derive(Debug, Clone)]
pub struct Orchestrator<L, P, W, I, R> {
    launcher: L,
    probe: P,
    watcher: W,
    interrupts: I,
    reporter: R,
}

/// Orchestrator wired to the production collaborators.
pub type SystemOrchestrator = Orchestrator<
    SystemLauncher,
    SocketProbe,
    NotifyRemovalWatcher,
    SignalInterruptHook,
    StructuredLifecycleReporter,
>;

impl SystemOrchestrator {
    /// Builds an orchestrator using TCP servers and probes, `notify`
    /// removal watching and process signals.
    #[must_use]
    pub fn system() -> Self {
        Self::new(
            SystemLauncher::default(),
            SocketProbe::default(),
            NotifyRemovalWatcher,
            SignalInterruptHook,
            StructuredLifecycleReporter,
        )
    }
}

impl<L, P, W, I, R> Orchestrator<L, P, W, I, R>
where
    L: ServerLauncher,
    P: LivenessProbe,
    W: RemovalWatcher,
    I: InterruptHook,
    R: LifecycleReporter,
{
    /// Builds an orchestrator from its collaborators.
    pub const fn new(launcher: L, probe: P, watcher: W, interrupts: I, reporter: R) -> Self {
        Self {
            launcher,
            probe,
            watcher,
            interrupts,
            reporter,
        }
    }

    /// Finds the published server or becomes its owner.
    ///
    /// An absent or empty `discovery` path starts a server without any
    /// locking or publication.
    pub fn acquire(
        &self,
        discovery: Option<&Path>,
        config: &ServerConfig,
        context: &LockContext,
    ) -> Result<Acquisition, LifecycleError> {
        match discovery.filter(|path| !path.as_os_str().is_empty()) {
            Some(path) => self.find_or_start(path, config, context),
            None => self.start_foreground(config).map(Acquisition::Owned),
        }
    }

    /// Acquires the server and, when owned, serves until shutdown.
    pub fn run(
        &self,
        discovery: Option<&Path>,
        config: &ServerConfig,
        context: &LockContext,
    ) -> Result<RunOutcome, LifecycleError> {
        match self.acquire(discovery, config, context)? {
            Acquisition::Existing(endpoint) => Ok(RunOutcome::AlreadyRunning { endpoint }),
            Acquisition::Owned(owned) => {
                let endpoint = owned.endpoint().to_string();
                let report = owned.wait()?;
                self.reporter
                    .shutdown_completed(&endpoint, report.cause, report.removal.as_ref());
                Ok(RunOutcome::Served {
                    endpoint,
                    cause: report.cause,
                })
            }
        }
    }

    fn find_or_start(
        &self,
        path: &Path,
        config: &ServerConfig,
        context: &LockContext,
    ) -> Result<Acquisition, LifecycleError> {
        let mut lock =
            AdvisoryLock::open(path).map_err(|source| LifecycleError::AcquireRead { source })?;
        lock.acquire_shared(context)
            .map_err(|source| LifecycleError::AcquireRead { source })?;
        if let Some(endpoint) = self.live_endpoint(&mut lock)? {
            lock.release();
            self.reporter.existing_server(path, &endpoint, false);
            return Ok(Acquisition::Existing(endpoint));
        }

        lock.acquire_exclusive(context)
            .map_err(|source| LifecycleError::UpgradeExclusive { source })?;
        if let Some(endpoint) = self.live_endpoint(&mut lock)? {
            lock.release();
            self.reporter.existing_server(path, &endpoint, true);
            return Ok(Acquisition::Existing(endpoint));
        }

        let server = self
            .launcher
            .start(config)
            .map_err(|source| LifecycleError::Start { source })?;
        let endpoint = server.endpoint().to_string();
        if let Err(source) =
            discovery::publish_record(&mut lock, &DiscoveryRecord::published(endpoint.as_str()))
        {
            self.reporter.compensating_shutdown(&endpoint, &source);
            server.shutdown();
            server.wait_for_shutdown();
            return Err(LifecycleError::Publish {
                path: path.to_path_buf(),
                source,
            });
        }
        lock.release();
        drop(lock);
        self.reporter.server_published(path, &endpoint);

        let subscriptions = self.install_watchers(path, &server);
        Ok(Acquisition::Owned(OwnedServer {
            server,
            discovery: Some(path.to_path_buf()),
            subscriptions,
        }))
    }

    fn start_foreground(&self, config: &ServerConfig) -> Result<OwnedServer, LifecycleError> {
        let server = self
            .launcher
            .start(config)
            .map_err(|source| LifecycleError::Start { source })?;
        self.reporter
            .foreground_started(&server.endpoint().to_string());
        let trigger = server.trigger();
        let subscriptions = match self.interrupts.install(Box::new(move || {
            trigger.trigger(ShutdownCause::ProcessInterrupt);
        })) {
            Ok(subscription) => vec![subscription],
            Err(error) => {
                self.reporter.interrupt_unavailable(&error);
                Vec::new()
            }
        };
        Ok(OwnedServer {
            server,
            discovery: None,
            subscriptions,
        })
    }

    /// Reads the record under the held lock and returns its endpoint when it
    /// answers the probe. Read failures count as an empty record unless the
    /// lock itself is at fault.
    fn live_endpoint(&self, lock: &mut AdvisoryLock) -> Result<Option<String>, LifecycleError> {
        let record = match discovery::read_record(lock) {
            Ok(record) => record,
            Err(error @ LockError::Io { .. }) => {
                self.reporter.record_unreadable(lock.path(), &error);
                DiscoveryRecord::empty()
            }
            Err(source) => return Err(LifecycleError::ReadRecord { source }),
        };
        let Some(endpoint) = record.endpoint() else {
            return Ok(None);
        };
        if self.probe.probe(endpoint) {
            Ok(Some(endpoint.to_owned()))
        } else {
            self.reporter.stale_record(lock.path(), endpoint);
            Ok(None)
        }
    }

    fn install_watchers(&self, path: &Path, server: &BackgroundServer) -> Vec<Subscription> {
        let mut subscriptions = Vec::with_capacity(2);

        let interrupt_trigger = server.trigger();
        let interrupt_path = path.to_path_buf();
        let interrupt_endpoint = server.endpoint().to_string();
        match self.interrupts.install(Box::new(move || {
            interrupt_trigger.trigger(ShutdownCause::ProcessInterrupt);
            remove_after_interrupt(&interrupt_path, &interrupt_endpoint);
        })) {
            Ok(subscription) => subscriptions.push(subscription),
            Err(error) => self.reporter.interrupt_unavailable(&error),
        }

        let removal_trigger = server.trigger();
        match self.watcher.watch(
            path,
            Box::new(move || removal_trigger.trigger(ShutdownCause::DiscoveryFileRemoved)),
        ) {
            Ok(subscription) => subscriptions.push(subscription),
            Err(error) => self.reporter.watch_unavailable(path, &error),
        }
        subscriptions
    }
}

fn remove_after_interrupt(path: &Path, endpoint: &str) {
    let context = LockContext::with_timeout(CLEANUP_TIMEOUT);
    if let Err(error) = discovery::remove_if_owned(path, endpoint, &context) {
        warn!(
            target: LIFECYCLE_TARGET,
            file = %path.display(),
            error = %error,
            "failed to remove discovery file after interrupt"
        );
    }
}

/// Returns the published endpoint when it answers, without ever starting a
/// server. A missing discovery file is not created.
pub fn lookup<P>(
    path: &Path,
    probe: &P,
    context: &LockContext,
) -> Result<Option<String>, LifecycleError>
where
    P: LivenessProbe + ?Sized,
{
    let Some(mut lock) = AdvisoryLock::open_existing(path)
        .map_err(|source| LifecycleError::AcquireRead { source })?
    else {
        return Ok(None);
    };
    match lock.acquire_shared(context) {
        Ok(()) => {}
        Err(LockError::Vanished { .. }) => return Ok(None),
        Err(source) => return Err(LifecycleError::AcquireRead { source }),
    }
    let record = discovery::read_record(&mut lock)
        .map_err(|source| LifecycleError::ReadRecord { source })?;
    Ok(record
        .endpoint()
        .filter(|endpoint| probe.probe(endpoint))
        .map(str::to_owned))
}
