//! Coordination for a single shared background server per build session.
//!
//! Any number of concurrent processes may ask for the server. They agree on
//! one through a discovery file guarded by an advisory lock: the first
//! process to win the exclusive lock starts the server and writes its
//! endpoint, and every other process reads that endpoint back. The owning
//! process keeps the server alive until it has been idle for the configured
//! timeout, the discovery file is deleted, or the process is interrupted,
//! and then removes its record.
//!
//! The building blocks are usable on their own:
//!
//! - [`lock`] provides the shared/exclusive file lock with timeouts and
//!   cancellation.
//! - [`discovery`] reads, writes and removes the endpoint record.
//! - [`probe`] decides whether a recorded endpoint still answers.
//! - [`server`] runs the TCP listener with its inactivity timer.
//! - [`watch`] reports deletion of the discovery file.
//! - [`lifecycle`] composes them into the find-or-start protocol.

pub mod discovery;
pub mod lifecycle;
pub mod lock;
pub mod probe;
pub mod process;
pub mod server;
mod telemetry;
pub mod watch;

pub use lifecycle::{
    Acquisition, LifecycleError, LifecycleReporter, Orchestrator, OwnedServer, RunOutcome,
    ShutdownReport, StructuredLifecycleReporter, SystemOrchestrator, lookup,
};
pub use process::{
    DaemonizeError, Daemonizer, EXIT_ALREADY_RUNNING, InterruptCallback, InterruptError,
    InterruptHook, LaunchError, LaunchMode, SignalInterruptHook, SystemDaemonizer,
    report_outcome, run_server,
};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
