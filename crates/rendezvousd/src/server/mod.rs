//! Background server owning a listening endpoint.
//!
//! A started server accepts connections on its own threads, counts them, and
//! stops itself after the configured inactivity timeout. Every shutdown
//! source sends a [`ShutdownCause`] to one coordinator thread, so the stop
//! sequence runs exactly once no matter how many causes race.

mod activity;
mod coordinator;
mod errors;
mod handler;
mod listener;

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rendezvous_config::{Endpoint, ServerConfig};
use tracing::{info, warn};

use self::listener::{BoundListener, ListenerHandle};

pub use self::activity::{ActivityTracker, ConnectionGuard};
pub use self::coordinator::{ShutdownCause, ShutdownTrigger};
pub use self::errors::StartError;
pub use self::handler::{ConnectionHandler, IdleConnectionHandler};

pub(crate) const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Lifecycle of one server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Binding and spawning worker threads.
    Starting,
    /// Accepting connections.
    Running,
    /// A shutdown cause was accepted and the stop sequence is running.
    ShuttingDown,
    /// Listener closed and timer stopped.
    Stopped,
}

#[derive(Debug)]
struct Progress {
    state: ServerState,
    cause: Option<ShutdownCause>,
}

#[derive(Debug)]
struct Lifecycle {
    progress: Mutex<Progress>,
    changed: Condvar,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            progress: Mutex::new(Progress {
                state: ServerState::Starting,
                cause: None,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, state: ServerState, cause: Option<ShutdownCause>) {
        let mut progress = self.lock();
        progress.state = state;
        if cause.is_some() {
            progress.cause = cause;
        }
        drop(progress);
        self.changed.notify_all();
    }

    /// Moves `Starting` to `Running`; a cause that arrived first keeps its
    /// later state.
    fn mark_running(&self) {
        let mut progress = self.lock();
        if progress.state == ServerState::Starting {
            progress.state = ServerState::Running;
        }
    }

    fn stopped_cause(progress: &Progress) -> Option<ShutdownCause> {
        if progress.state == ServerState::Stopped {
            progress.cause
        } else {
            None
        }
    }
}

/// Handle to a started server.
///
/// Dropping the handle requests an explicit shutdown.
#[derive(Debug)]
pub struct BackgroundServer {
    endpoint: Endpoint,
    trigger: ShutdownTrigger,
    lifecycle: Arc<Lifecycle>,
    activity: ActivityTracker,
}

impl BackgroundServer {
    /// Starts a server whose connections are held open until the peer
    /// closes them.
    pub fn start(config: &ServerConfig) -> Result<Self, StartError> {
        Self::start_with_handler(config, Arc::new(IdleConnectionHandler))
    }

    /// Starts a server that hands each connection to `handler`.
    ///
    /// Nothing is left running when this returns an error.
    pub fn start_with_handler(
        config: &ServerConfig,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<Self, StartError> {
        let lifecycle = Arc::new(Lifecycle::new());
        let (trigger, receiver) = coordinator::channel();
        let bound = BoundListener::bind(config)?;
        let endpoint = bound.endpoint().clone();

        let activity = ActivityTracker::new(config.inactivity_timeout());
        let timer = activity
            .spawn_timer(trigger.clone())
            .map_err(StartError::thread)?;
        let listener = match bound.start(handler, activity.clone(), config.verbose()) {
            Ok(listener) => listener,
            Err(error) => {
                activity.stop();
                return Err(error);
            }
        };

        let stop_lifecycle = Arc::clone(&lifecycle);
        let stop_activity = activity.clone();
        let stop_endpoint = endpoint.clone();
        let listener_slot = Arc::new(Mutex::new(Some(listener)));
        let coordinator_slot = Arc::clone(&listener_slot);
        let spawned = coordinator::spawn(receiver, move |cause| {
            stop_lifecycle.transition(ServerState::ShuttingDown, Some(cause));
            info!(
                target: SERVER_TARGET,
                endpoint = %stop_endpoint,
                %cause,
                "server shutting down"
            );
            stop_listener(&coordinator_slot);
            stop_activity.stop();
            if timer.join().is_err() {
                warn!(target: SERVER_TARGET, "inactivity timer panicked");
            }
            stop_lifecycle.transition(ServerState::Stopped, None);
            info!(target: SERVER_TARGET, endpoint = %stop_endpoint, "server stopped");
        });
        if let Err(source) = spawned {
            stop_listener(&listener_slot);
            activity.stop();
            return Err(StartError::thread(source));
        }

        lifecycle.mark_running();
        info!(
            target: SERVER_TARGET,
            endpoint = %endpoint,
            inactivity_timeout_ms = u64::try_from(config.inactivity_timeout().as_millis())
                .unwrap_or(u64::MAX),
            "server started"
        );
        Ok(Self {
            endpoint,
            trigger,
            lifecycle,
            activity,
        })
    }

    /// Endpoint clients connect to.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Requests shutdown. Repeated calls are no-ops.
    pub fn shutdown(&self) {
        self.trigger.trigger(ShutdownCause::ExplicitCall);
    }

    /// Sender for wiring external shutdown sources.
    #[must_use]
    pub fn trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        self.lifecycle.lock().state
    }

    /// Number of currently open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.activity.active_connections()
    }

    /// Blocks until the server has stopped and returns the winning cause.
    ///
    /// Any number of threads may wait at once; all of them return together.
    pub fn wait_for_shutdown(&self) -> ShutdownCause {
        let mut progress = self.lifecycle.lock();
        loop {
            if let Some(cause) = Lifecycle::stopped_cause(&progress) {
                return cause;
            }
            progress = self
                .lifecycle
                .changed
                .wait(progress)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`Self::wait_for_shutdown`] but gives up after `timeout`.
    pub fn wait_for_shutdown_timeout(&self, timeout: Duration) -> Option<ShutdownCause> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.wait_for_shutdown());
        };
        let mut progress = self.lifecycle.lock();
        loop {
            if let Some(cause) = Lifecycle::stopped_cause(&progress) {
                return Some(cause);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            progress = self
                .lifecycle
                .changed
                .wait_timeout(progress, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl Drop for BackgroundServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn stop_listener(slot: &Mutex<Option<ListenerHandle>>) {
    let listener = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(listener) = listener {
        listener.stop();
    }
}

/// Starts servers on behalf of the lifecycle orchestrator.
pub trait ServerLauncher: Send + Sync {
    /// Starts a server for `config`.
    fn start(&self, config: &ServerConfig) -> Result<BackgroundServer, StartError>;
}

/// Launcher starting in-process TCP servers with a shared handler.
#[derive(Clone)]
pub struct SystemLauncher {
    handler: Arc<dyn ConnectionHandler>,
}

impl SystemLauncher {
    /// Launcher whose servers hand connections to `handler`.
    #[must_use]
    pub fn with_handler(handler: Arc<dyn ConnectionHandler>) -> Self {
        Self { handler }
    }
}

impl Default for SystemLauncher {
    fn default() -> Self {
        Self::with_handler(Arc::new(IdleConnectionHandler))
    }
}

impl ServerLauncher for SystemLauncher {
    fn start(&self, config: &ServerConfig) -> Result<BackgroundServer, StartError> {
        BackgroundServer::start_with_handler(config, Arc::clone(&self.handler))
    }
}
