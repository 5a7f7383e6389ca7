//! Timeout enforcement for outbound dials.
//!
//! Only connection establishment is bounded. Established relays carry no
//! read/write deadline; idle timeouts belong to the workers.

use std::io;
use std::time::Duration;

use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::timeout;

/// Connect to `addr`, failing with `TimedOut` after `limit`.
pub async fn connect_with_timeout<A: ToSocketAddrs>(addr: A, limit: Duration) -> io::Result<TcpStream> {
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timeout")),
    }
}
