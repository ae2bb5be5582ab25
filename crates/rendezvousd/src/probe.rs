//! Liveness probing of published endpoints.
//!
//! A probe opens a TCP connection and drops it straight away. Every failure,
//! including an endpoint string that does not parse, reads as "not alive":
//! callers cannot tell a dead server from garbage in the discovery file and
//! do not need to.

use std::io;
use std::net::TcpStream;
use std::time::Duration;

use rendezvous_config::Endpoint;
use tracing::debug;

const PROBE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::probe");
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Checks whether an endpoint currently answers.
pub trait LivenessProbe: Send + Sync {
    /// Returns `true` when a connection to `endpoint` succeeds.
    fn probe(&self, endpoint: &str) -> bool;
}

/// Probe connecting over TCP with a bounded timeout.
#[derive(Debug, Clone, Copy)]
pub struct SocketProbe {
    timeout: Duration,
}

impl SocketProbe {
    /// Builds a probe with a custom connect timeout.
    #[must_use]
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SocketProbe {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_PROBE_TIMEOUT)
    }
}

impl LivenessProbe for SocketProbe {
    fn probe(&self, endpoint: &str) -> bool {
        match try_connect(endpoint, self.timeout) {
            Ok(()) => true,
            Err(error) => {
                debug!(
                    target: PROBE_TARGET,
                    endpoint,
                    error = %error,
                    "endpoint did not answer"
                );
                false
            }
        }
    }
}

fn try_connect(endpoint: &str, timeout: Duration) -> io::Result<()> {
    let parsed: Endpoint = endpoint
        .parse()
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;
    let address = parsed.resolve()?;
    TcpStream::connect_timeout(&address, timeout).map(drop)
}
