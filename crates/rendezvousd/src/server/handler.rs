//! Connection handling seam.
//!
//! The service protocol spoken over a connection lives outside this crate;
//! handlers only need to return once the peer is done.

use std::io::{self, Read};
use std::net::TcpStream;

use tracing::debug;

use super::SERVER_TARGET;

/// Services one accepted connection. The connection counts as active until
/// `handle` returns.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: TcpStream);
}

/// Holds each connection open until the peer closes it.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleConnectionHandler;

impl ConnectionHandler for IdleConnectionHandler {
    fn handle(&self, mut stream: TcpStream) {
        if let Err(error) = drain(&mut stream) {
            debug!(
                target: SERVER_TARGET,
                error = %error,
                "connection closed with error"
            );
        }
    }
}

fn drain(stream: &mut TcpStream) -> io::Result<()> {
    let mut chunk = [0_u8; 1024];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(_) => {}
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
}
