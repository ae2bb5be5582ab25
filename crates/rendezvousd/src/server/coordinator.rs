//! Single-consumer funnel for shutdown causes.
//!
//! Every trigger (inactivity timer, removal watcher, interrupt hook, explicit
//! call) only sends a message. One coordinator thread receives the first
//! cause and runs the shutdown sequence; later causes find the channel closed
//! and are dropped.

use std::fmt;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::debug;

use super::SERVER_TARGET;

/// Reason a server began shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownCause {
    /// No client was connected for the configured inactivity timeout.
    InactivityTimeout,
    /// The discovery file was deleted.
    DiscoveryFileRemoved,
    /// The process received an interrupt or termination signal.
    ProcessInterrupt,
    /// `shutdown()` was called.
    ExplicitCall,
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::InactivityTimeout => "inactivity timeout",
            Self::DiscoveryFileRemoved => "discovery file removed",
            Self::ProcessInterrupt => "process interrupt",
            Self::ExplicitCall => "explicit call",
        })
    }
}

/// Cloneable sender handed to every shutdown source.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    sender: Sender<ShutdownCause>,
}

impl ShutdownTrigger {
    /// Requests shutdown. Ignored once the server has already begun stopping.
    pub fn trigger(&self, cause: ShutdownCause) {
        if self.sender.send(cause).is_err() {
            debug!(
                target: SERVER_TARGET,
                %cause,
                "shutdown already under way; cause ignored"
            );
        }
    }
}

pub(super) fn channel() -> (ShutdownTrigger, Receiver<ShutdownCause>) {
    let (sender, receiver) = mpsc::channel();
    (ShutdownTrigger { sender }, receiver)
}

/// Spawns the coordinator. `on_first` runs exactly once with the winning
/// cause; dropping every trigger counts as an explicit call.
pub(super) fn spawn<F>(receiver: Receiver<ShutdownCause>, on_first: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce(ShutdownCause) + Send + 'static,
{
    thread::Builder::new()
        .name("rendezvous-shutdown".to_owned())
        .spawn(move || {
            let cause = receiver.recv().unwrap_or(ShutdownCause::ExplicitCall);
            drop(receiver);
            on_first(cause);
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn first_cause_wins_and_later_causes_are_ignored() {
        let (trigger, receiver) = channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);
        trigger.trigger(ShutdownCause::DiscoveryFileRemoved);
        trigger.trigger(ShutdownCause::InactivityTimeout);
        let handle = spawn(receiver, move |cause| {
            recorded.lock().expect("record lock").push(cause);
        })
        .expect("spawn coordinator");
        handle.join().expect("join coordinator");
        trigger.trigger(ShutdownCause::ExplicitCall);
        assert_eq!(
            *seen.lock().expect("seen lock"),
            vec![ShutdownCause::DiscoveryFileRemoved]
        );
    }

    #[test]
    fn dropping_every_trigger_counts_as_explicit_call() {
        let (trigger, receiver) = channel();
        let seen = Arc::new(Mutex::new(None));
        let recorded = Arc::clone(&seen);
        drop(trigger);
        spawn(receiver, move |cause| {
            *recorded.lock().expect("record lock") = Some(cause);
        })
        .expect("spawn coordinator")
        .join()
        .expect("join coordinator");
        assert_eq!(*seen.lock().expect("seen lock"), Some(ShutdownCause::ExplicitCall));
    }
}
