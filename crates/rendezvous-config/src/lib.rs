//! Shared configuration for the rendezvous coordination daemon.
//!
//! Values are layered by `ortho_config`: built-in defaults, then an optional
//! configuration file, then `RENDEZVOUS_*` environment variables, and finally
//! command-line flags. The resolved [`Config`] is converted into the
//! immutable [`ServerConfig`] consumed when a server is started, while the
//! discovery path and lock deadline steer the find-or-start protocol.

mod defaults;
mod endpoint;
mod logging;
mod server;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_HOST, DEFAULT_INACTIVITY_TIMEOUT_SECS, DEFAULT_LOCK_TIMEOUT_SECS, DEFAULT_LOG_FILTER,
    default_host, default_inactivity_timeout_secs, default_lock_timeout_secs, default_log_filter,
    default_log_format,
};
pub use endpoint::{Endpoint, EndpointParseError};
pub use logging::{LogFormat, LogFormatParseError};
pub use server::{PortSelection, ServerConfig};

/// Resolved configuration for the `rendezvousd` binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "RENDEZVOUS")]
pub struct Config {
    /// File publishing the endpoint of the live server. Unset or empty runs
    /// the server in the foreground without any discovery semantics.
    #[serde(default)]
    pub discovery_file: Option<Utf8PathBuf>,
    /// Explicit TCP port. Unset picks any free port.
    #[serde(default)]
    pub port: Option<u16>,
    /// Interface the server binds to.
    #[serde(default = "defaults::default_host")]
    #[ortho_config(default = defaults::default_host())]
    pub host: String,
    /// Seconds without any connected client before the server stops.
    #[serde(default = "defaults::default_inactivity_timeout_secs")]
    #[ortho_config(default = defaults::DEFAULT_INACTIVITY_TIMEOUT_SECS)]
    pub inactivity_timeout_secs: u64,
    /// Deadline for each lock acquisition, in seconds. Zero waits forever.
    #[serde(default = "defaults::default_lock_timeout_secs")]
    #[ortho_config(default = defaults::DEFAULT_LOCK_TIMEOUT_SECS)]
    pub lock_timeout_secs: u64,
    /// Emits per-connection server events.
    #[serde(default)]
    pub verbose: bool,
    /// Detaches into the background before coordinating.
    #[serde(default)]
    pub detach: bool,
    /// `tracing` filter expression.
    #[serde(default = "defaults::default_log_filter")]
    #[ortho_config(default = defaults::default_log_filter())]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "defaults::default_log_format")]
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_file: None,
            port: None,
            host: default_host(),
            inactivity_timeout_secs: DEFAULT_INACTIVITY_TIMEOUT_SECS,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            verbose: false,
            detach: false,
            log_filter: default_log_filter(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Discovery path, treating an empty value the same as an absent one.
    #[must_use]
    pub fn discovery_path(&self) -> Option<&Utf8Path> {
        self.discovery_file
            .as_deref()
            .filter(|path| !path.as_str().trim().is_empty())
    }

    /// Deadline applied to lock acquisition; `None` waits indefinitely.
    #[must_use]
    pub fn lock_timeout(&self) -> Option<Duration> {
        (self.lock_timeout_secs > 0).then(|| Duration::from_secs(self.lock_timeout_secs))
    }

    /// Builds the immutable server configuration.
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        let port = self.port.map_or(PortSelection::Any, PortSelection::Fixed);
        ServerConfig::new(self.host.clone())
            .with_port(port)
            .with_inactivity_timeout(Duration::from_secs(self.inactivity_timeout_secs))
            .with_verbose(self.verbose)
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
