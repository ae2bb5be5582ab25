//! Error types for starting a background server.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced while starting a server. None of them leave a listener
/// or worker thread behind.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty { host: String, port: u16 },
    #[error("failed to bind TCP listener at {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("ran out of {resource} while starting the server: {source}")]
    ResourceExhausted {
        resource: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        #[source]
        source: io::Error,
    },
}

impl StartError {
    pub(super) fn bind(addr: SocketAddr, source: io::Error) -> Self {
        if is_descriptor_exhaustion(&source) {
            Self::ResourceExhausted {
                resource: "file descriptors",
                source,
            }
        } else {
            Self::Bind { addr, source }
        }
    }

    pub(super) fn thread(source: io::Error) -> Self {
        Self::ResourceExhausted {
            resource: "threads",
            source,
        }
    }
}

fn is_descriptor_exhaustion(error: &io::Error) -> bool {
    matches!(error.raw_os_error(), Some(code) if code == libc::EMFILE || code == libc::ENFILE)
}
