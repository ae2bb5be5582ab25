//! Interrupt handling for an owning server process.
//!
//! Signals are delivered on a dedicated thread and turned into a single
//! callback. Dropping the returned subscription closes the signal iterator so
//! the thread exits.

use std::io;
use std::thread;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;
use crate::watch::Subscription;

/// Callback run once when the process is interrupted.
pub type InterruptCallback = Box<dyn FnOnce() + Send + 'static>;

/// Installs interrupt handling for the lifetime of a subscription.
pub trait InterruptHook: Send + Sync {
    /// Runs `on_interrupt` when the process receives a termination signal.
    fn install(&self, on_interrupt: InterruptCallback) -> Result<Subscription, InterruptError>;
}

/// Errors reported while installing interrupt handling.
#[derive(Debug, Error)]
pub enum InterruptError {
    /// Registering the signal handlers or their thread failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Hook listening for SIGTERM, SIGINT, SIGQUIT and SIGHUP.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalInterruptHook;

impl InterruptHook for SignalInterruptHook {
    fn install(&self, on_interrupt: InterruptCallback) -> Result<Subscription, InterruptError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| InterruptError::Install { source })?;
        let handle = signals.handle();
        thread::Builder::new()
            .name("rendezvous-signals".to_owned())
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    info!(
                        target: PROCESS_TARGET,
                        signal,
                        "interrupt signal received"
                    );
                    on_interrupt();
                }
            })
            .map_err(|source| {
                handle.close();
                InterruptError::Install { source }
            })?;
        Ok(Subscription::new(SignalSubscription { handle }))
    }
}

struct SignalSubscription {
    handle: Handle,
}

impl Drop for SignalSubscription {
    fn drop(&mut self) {
        self.handle.close();
    }
}
