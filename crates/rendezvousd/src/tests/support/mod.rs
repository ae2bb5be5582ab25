//! Shared fixtures and collaborator doubles for the lifecycle suites.

mod doubles;
mod reporter;

use std::net::TcpListener;
use std::path::PathBuf;
use std::time::Duration;

use rendezvous_config::{Endpoint, ServerConfig};
use tempfile::TempDir;

pub use doubles::{
    CountingLauncher, FailingLauncher, InertInterruptHook, ManualInterruptHook, RecordingDaemonizer,
    UnavailableWatcher,
};
pub use reporter::{LifecycleEvent, RecordingReporter};

/// Upper bound for anything a test waits on.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Temporary directory holding one discovery file.
pub struct DiscoveryDir {
    _dir: TempDir,
    path: PathBuf,
}

impl DiscoveryDir {
    /// Creates a fresh directory; the discovery file itself does not exist.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("server.url");
        Self { _dir: dir, path }
    }

    /// Discovery file path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Current raw content, or `None` when the file is missing.
    pub fn content(&self) -> Option<String> {
        std::fs::read_to_string(&self.path).ok()
    }

    /// Seeds the file with `content`.
    pub fn seed(&self, content: &str) {
        std::fs::write(&self.path, content).expect("seed discovery file");
    }
}

/// Loopback server configuration that stays up for the whole test.
pub fn long_lived_config() -> ServerConfig {
    ServerConfig::new("127.0.0.1").with_inactivity_timeout(Duration::from_secs(60))
}

/// Well-formed endpoint nobody listens on.
pub fn dead_endpoint() -> String {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind probe port");
    let endpoint = Endpoint::from(listener.local_addr().expect("local addr"));
    drop(listener);
    endpoint.to_string()
}
