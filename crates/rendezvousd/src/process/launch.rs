//! Entry point sequencing for the `rendezvousd` binary.

use std::env;
use std::io::Write;

use rendezvous_config::Config;
use tracing::info;

use crate::lifecycle::{LifecycleReporter, Orchestrator, RunOutcome, SystemOrchestrator};
use crate::lock::LockContext;
use crate::probe::LivenessProbe;
use crate::server::ServerLauncher;
use crate::telemetry;
use crate::watch::RemovalWatcher;

use super::PROCESS_TARGET;
use super::daemonizer::{Daemonizer, SystemDaemonizer};
use super::errors::LaunchError;
use super::interrupt::InterruptHook;

/// Exit status reported when another process already owns the server.
pub const EXIT_ALREADY_RUNNING: u8 = 2;

/// Launch mode for the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Fork into the background and detach from the controlling terminal.
    Background,
    /// Remain attached to the terminal.
    Foreground,
}

impl LaunchMode {
    /// Mode requested by `config`.
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        if config.detach {
            Self::Background
        } else {
            Self::Foreground
        }
    }
}

/// Runs the coordination protocol with the production collaborators.
pub fn run_server(config: &Config) -> Result<RunOutcome, LaunchError> {
    telemetry::initialise(config)?;
    run_server_with(
        config,
        LaunchMode::from_config(config),
        &SystemDaemonizer,
        &SystemOrchestrator::system(),
    )
}

/// Runs the coordination protocol with injected collaborators.
pub(crate) fn run_server_with<D, L, P, W, I, R>(
    config: &Config,
    mode: LaunchMode,
    daemonizer: &D,
    orchestrator: &Orchestrator<L, P, W, I, R>,
) -> Result<RunOutcome, LaunchError>
where
    D: Daemonizer,
    L: ServerLauncher,
    P: LivenessProbe,
    W: RemovalWatcher,
    I: InterruptHook,
    R: LifecycleReporter,
{
    let discovery = config.discovery_path();
    info!(
        target: PROCESS_TARGET,
        ?mode,
        discovery = discovery.map(|path| path.as_str()).unwrap_or_default(),
        "starting rendezvous"
    );
    if mode == LaunchMode::Background {
        let work_dir =
            env::current_dir().map_err(|source| LaunchError::WorkingDirectory { source })?;
        daemonizer.daemonize(&work_dir)?;
    }
    let context = LockContext::from_timeout(config.lock_timeout());
    let outcome = orchestrator.run(
        discovery.map(|path| path.as_std_path()),
        &config.server_config(),
        &context,
    )?;
    info!(
        target: PROCESS_TARGET,
        outcome = ?outcome,
        "rendezvous finished"
    );
    Ok(outcome)
}

/// Writes the user-facing result and returns the process exit status.
///
/// An already running server prints its endpoint on `stdout` so callers
/// can connect to it, and exits with [`EXIT_ALREADY_RUNNING`].
pub fn report_outcome(
    result: &Result<RunOutcome, LaunchError>,
    stdout: &mut impl Write,
    stderr: &mut impl Write,
) -> u8 {
    match result {
        Ok(RunOutcome::Served { .. }) => 0,
        Ok(RunOutcome::AlreadyRunning { endpoint }) => {
            let _ = writeln!(stdout, "{endpoint}");
            let _ = writeln!(stderr, "rendezvousd: server already running at {endpoint}");
            EXIT_ALREADY_RUNNING
        }
        Err(error) => {
            let _ = writeln!(stderr, "rendezvousd: {error}");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;

    use camino::Utf8PathBuf;
    use rstest::rstest;
    use tempfile::TempDir;

    use crate::probe::SocketProbe;
    use crate::server::ShutdownCause;
    use crate::tests::support::{
        CountingLauncher, InertInterruptHook, RecordingDaemonizer, RecordingReporter,
        UnavailableWatcher,
    };

    #[test]
    fn served_outcome_exits_cleanly() {
        let result = Ok(RunOutcome::Served {
            endpoint: "tcp://127.0.0.1:1".to_owned(),
            cause: ShutdownCause::InactivityTimeout,
        });
        let (mut out, mut err) = (Vec::new(), Vec::new());
        assert_eq!(report_outcome(&result, &mut out, &mut err), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn already_running_prints_endpoint_and_exits_with_two() {
        let result = Ok(RunOutcome::AlreadyRunning {
            endpoint: "tcp://127.0.0.1:4000".to_owned(),
        });
        let (mut out, mut err) = (Vec::new(), Vec::new());
        assert_eq!(
            report_outcome(&result, &mut out, &mut err),
            EXIT_ALREADY_RUNNING
        );
        assert_eq!(String::from_utf8_lossy(&out), "tcp://127.0.0.1:4000\n");
        assert!(String::from_utf8_lossy(&err).contains("already running"));
    }

    #[test]
    fn failures_exit_with_one() {
        let result = Err(LaunchError::WorkingDirectory {
            source: io::Error::from(io::ErrorKind::NotFound),
        });
        let (mut out, mut err) = (Vec::new(), Vec::new());
        assert_eq!(report_outcome(&result, &mut out, &mut err), 1);
        assert!(String::from_utf8_lossy(&err).contains("working directory"));
    }

    #[rstest]
    #[case(LaunchMode::Background, 1)]
    #[case(LaunchMode::Foreground, 0)]
    fn background_mode_detaches_first(#[case] mode: LaunchMode, #[case] expected_calls: usize) {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("server.url");
        let config = Config {
            discovery_file: Some(Utf8PathBuf::from_path_buf(path).expect("utf8 path")),
            inactivity_timeout_secs: 0,
            ..Config::default()
        };
        let daemonizer = RecordingDaemonizer::default();
        let orchestrator = Orchestrator::new(
            CountingLauncher::default(),
            SocketProbe::default(),
            UnavailableWatcher,
            InertInterruptHook,
            Arc::new(RecordingReporter::default()),
        );
        let outcome =
            run_server_with(&config, mode, &daemonizer, &orchestrator).expect("run completes");
        assert!(matches!(
            outcome,
            RunOutcome::Served {
                cause: ShutdownCause::InactivityTimeout,
                ..
            }
        ));
        assert_eq!(daemonizer.calls(), expected_calls);
    }
}
