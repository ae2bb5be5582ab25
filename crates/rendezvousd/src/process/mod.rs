//! Process-level plumbing: detaching, interrupts and the binary entry point.

pub(crate) mod daemonizer;
mod errors;
pub(crate) mod interrupt;
pub(crate) mod launch;

pub use daemonizer::{DaemonizeError, Daemonizer, SystemDaemonizer};
pub use errors::LaunchError;
pub use interrupt::{InterruptCallback, InterruptError, InterruptHook, SignalInterruptHook};
pub use launch::{EXIT_ALREADY_RUNNING, LaunchMode, report_outcome, run_server};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
