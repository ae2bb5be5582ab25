//! Connection accounting and the inactivity timer.
//!
//! The counter, the idle timestamp and the timer all live behind one mutex,
//! so opening a connection, closing one and the timer checking its deadline
//! are serialised against each other.

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use super::SERVER_TARGET;
use super::coordinator::{ShutdownCause, ShutdownTrigger};

#[derive(Debug)]
struct Activity {
    active: usize,
    idle_since: Option<Instant>,
    stopped: bool,
}

#[derive(Debug)]
struct Shared {
    activity: Mutex<Activity>,
    changed: Condvar,
    timeout: Duration,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Activity> {
        self.activity.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tracks active connections and raises an inactivity timeout.
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    shared: Arc<Shared>,
}

impl ActivityTracker {
    /// Builds a tracker whose idle countdown starts immediately.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                activity: Mutex::new(Activity {
                    active: 0,
                    idle_since: Some(Instant::now()),
                    stopped: false,
                }),
                changed: Condvar::new(),
                timeout,
            }),
        }
    }

    /// Records a new connection and cancels any pending countdown. The
    /// connection counts as active until the returned guard is dropped.
    #[must_use]
    pub fn connection_opened(&self) -> ConnectionGuard {
        let mut activity = self.shared.lock();
        activity.active += 1;
        activity.idle_since = None;
        drop(activity);
        self.shared.changed.notify_all();
        ConnectionGuard {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of currently open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.shared.lock().active
    }

    /// Stops the timer without raising a cause.
    pub fn stop(&self) {
        self.shared.lock().stopped = true;
        self.shared.changed.notify_all();
    }

    /// Spawns the timer thread that fires `trigger` once the server has
    /// been idle for the full timeout.
    pub(super) fn spawn_timer(&self, trigger: ShutdownTrigger) -> io::Result<JoinHandle<()>> {
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("rendezvous-inactivity".to_owned())
            .spawn(move || run_timer(&shared, &trigger))
    }
}

fn run_timer(shared: &Shared, trigger: &ShutdownTrigger) {
    let mut activity = shared.lock();
    loop {
        if activity.stopped {
            return;
        }
        match activity.idle_since {
            None => {
                activity = shared
                    .changed
                    .wait(activity)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            Some(since) => {
                let idle = since.elapsed();
                if idle >= shared.timeout {
                    // Stop and send under the same guard as connection accounting.
                    activity.stopped = true;
                    trigger.trigger(ShutdownCause::InactivityTimeout);
                    drop(activity);
                    debug!(
                        target: SERVER_TARGET,
                        idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX),
                        "inactivity timeout reached"
                    );
                    return;
                }
                activity = shared
                    .changed
                    .wait_timeout(activity, shared.timeout - idle)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
        }
    }
}

/// Marks one connection as active for as long as it lives.
#[derive(Debug)]
pub struct ConnectionGuard {
    shared: Arc<Shared>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let mut activity = self.shared.lock();
        activity.active = activity.active.saturating_sub(1);
        if activity.active == 0 {
            activity.idle_since = Some(Instant::now());
        }
        drop(activity);
        self.shared.changed.notify_all();
    }
}
