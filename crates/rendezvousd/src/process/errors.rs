//! Defines the unified error surface for the `rendezvousd` entry point.

use std::io;
use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use crate::lifecycle::LifecycleError;
use crate::telemetry::TelemetryError;

use super::daemonizer::DaemonizeError;

/// Errors surfaced while launching the coordination process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry could not be initialised.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The working directory to keep after detaching is unknown.
    #[error("failed to resolve working directory: {source}")]
    WorkingDirectory {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Daemonisation failed.
    #[error("failed to daemonise: {source}")]
    Daemonize {
        /// Underlying daemonisation error.
        #[source]
        source: DaemonizeError,
    },
    /// The find-or-start protocol failed.
    #[error("{source}")]
    Lifecycle {
        /// Underlying orchestration error.
        #[source]
        source: LifecycleError,
    },
}

impl From<Arc<OrthoError>> for LaunchError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Config { source }
    }
}

impl From<TelemetryError> for LaunchError {
    fn from(source: TelemetryError) -> Self {
        Self::Telemetry { source }
    }
}

impl From<DaemonizeError> for LaunchError {
    fn from(source: DaemonizeError) -> Self {
        Self::Daemonize { source }
    }
}

impl From<LifecycleError> for LaunchError {
    fn from(source: LifecycleError) -> Self {
        Self::Lifecycle { source }
    }
}
