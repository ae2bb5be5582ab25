//! Immutable configuration handed to a server when it starts.

use std::time::Duration;

use crate::defaults::{DEFAULT_INACTIVITY_TIMEOUT_SECS, default_host};

/// Port selection strategy for the listening socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortSelection {
    /// Let the operating system pick any free port.
    #[default]
    Any,
    /// Bind exactly this port.
    Fixed(u16),
}

impl PortSelection {
    /// Port number passed to `bind`; zero requests an ephemeral port.
    #[must_use]
    pub const fn as_bind_port(self) -> u16 {
        match self {
            Self::Any => 0,
            Self::Fixed(port) => port,
        }
    }
}

/// Server start parameters. Immutable once passed to a launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    host: String,
    port: PortSelection,
    inactivity_timeout: Duration,
    verbose: bool,
}

impl ServerConfig {
    /// Builds a configuration bound to `host` with default settings.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: PortSelection::Any,
            inactivity_timeout: Duration::from_secs(DEFAULT_INACTIVITY_TIMEOUT_SECS),
            verbose: false,
        }
    }

    /// Overrides the port selection.
    #[must_use]
    pub fn with_port(mut self, port: PortSelection) -> Self {
        self.port = port;
        self
    }

    /// Overrides the inactivity timeout.
    #[must_use]
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    /// Enables per-connection logging.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Interface the server binds to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Requested port.
    #[must_use]
    pub const fn port(&self) -> PortSelection {
        self.port
    }

    /// Duration of zero active connections after which the server stops.
    #[must_use]
    pub const fn inactivity_timeout(&self) -> Duration {
        self.inactivity_timeout
    }

    /// Whether per-connection events are logged.
    #[must_use]
    pub const fn verbose(&self) -> bool {
        self.verbose
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(default_host())
    }
}
