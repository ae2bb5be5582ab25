//! Non-blocking TCP accept loop feeding the activity tracker.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use rendezvous_config::{Endpoint, ServerConfig};
use tracing::{debug, info, warn};

use super::activity::ActivityTracker;
use super::{ConnectionHandler, SERVER_TARGET, StartError};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Bound listener that has not started accepting yet.
#[derive(Debug)]
pub(super) struct BoundListener {
    endpoint: Endpoint,
    listener: TcpListener,
}

impl BoundListener {
    pub(super) fn bind(config: &ServerConfig) -> Result<Self, StartError> {
        let port = config.port().as_bind_port();
        let addr = resolve(config.host(), port)?;
        let listener = TcpListener::bind(addr).map_err(|source| StartError::bind(addr, source))?;
        let local = listener
            .local_addr()
            .map_err(|source| StartError::bind(addr, source))?;
        // Publish the configured host so a hostname stays a hostname.
        let endpoint = if addr.ip().is_unspecified() {
            Endpoint::from(local)
        } else {
            Endpoint::new(config.host(), local.port())
        };
        Ok(Self { endpoint, listener })
    }

    pub(super) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(super) fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
        activity: ActivityTracker,
        verbose: bool,
    ) -> Result<ListenerHandle, StartError> {
        self.listener
            .set_nonblocking(true)
            .map_err(|source| StartError::NonBlocking { source })?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("rendezvous-accept".to_owned())
            .spawn(move || {
                run_accept_loop(&self, &shutdown_flag, &handler, &activity, verbose);
            })
            .map_err(StartError::thread)?;
        Ok(ListenerHandle {
            shutdown,
            handle: Some(handle),
        })
    }
}

/// Handle to the background accept thread.
#[derive(Debug)]
pub(super) struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Stops accepting and waits for the accept thread to exit. The socket
    /// is closed once this returns.
    pub(super) fn stop(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(target: SERVER_TARGET, "accept thread panicked");
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: &BoundListener,
    shutdown: &AtomicBool,
    handler: &Arc<dyn ConnectionHandler>,
    activity: &ActivityTracker,
    verbose: bool,
) {
    info!(
        target: SERVER_TARGET,
        endpoint = %listener.endpoint,
        "server listening"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match accept_connection(&listener.listener) {
            Ok(Some((stream, peer))) => {
                last_error = None;
                dispatch(stream, peer, handler, activity, verbose);
            }
            Ok(None) => thread::sleep(ACCEPT_BACKOFF),
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: SERVER_TARGET,
                        error = %error,
                        "socket accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    debug!(
        target: SERVER_TARGET,
        endpoint = %listener.endpoint,
        "accept loop exited"
    );
}

fn dispatch(
    stream: TcpStream,
    peer: SocketAddr,
    handler: &Arc<dyn ConnectionHandler>,
    activity: &ActivityTracker,
    verbose: bool,
) {
    let guard = activity.connection_opened();
    if verbose {
        debug!(target: SERVER_TARGET, %peer, "connection opened");
    }
    let handler = Arc::clone(handler);
    let spawned = thread::Builder::new()
        .name("rendezvous-conn".to_owned())
        .spawn(move || {
            handler.handle(stream);
            drop(guard);
            if verbose {
                debug!(target: SERVER_TARGET, %peer, "connection closed");
            }
        });
    if let Err(error) = spawned {
        warn!(
            target: SERVER_TARGET,
            %peer,
            error = %error,
            "failed to spawn connection thread; connection dropped"
        );
    }
}

fn accept_connection(listener: &TcpListener) -> io::Result<Option<(TcpStream, SocketAddr)>> {
    match listener.accept() {
        Ok((stream, peer)) => {
            stream.set_nonblocking(false)?;
            Ok(Some((stream, peer)))
        }
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, StartError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| StartError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| StartError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })
}
