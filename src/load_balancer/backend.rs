//! Backend descriptor.
//!
//! # Responsibilities
//! - Describe one configured remote server and the local relay address its
//!   worker listens on
//! - Stay immutable after startup; health lives in `crate::health`

use std::fmt;
use std::time::Duration;

/// One validated backend: a worker's relay endpoint plus the remote identity
/// the worker forwards to.
#[derive(Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    /// Ordinal position in the configured server list.
    pub index: usize,
    /// Remote server host. Opaque to the relay.
    pub server_addr: String,
    /// Remote server port. Opaque to the relay.
    pub server_port: u16,
    /// Host the worker binds and the relay dials.
    pub local_addr: String,
    /// Port the worker binds and the relay dials.
    pub local_port: u16,
    /// Worker cipher method.
    pub method: String,
    /// Worker password.
    pub password: String,
    /// Worker idle timeout in seconds. Handed to the worker, not enforced by the relay.
    pub timeout_secs: u64,
    /// How long the backend stays excluded after a failure.
    pub cooldown: Duration,
}

impl BackendDescriptor {
    /// Address the relay dials, as a `(host, port)` pair usable with `ToSocketAddrs`.
    pub fn relay_target(&self) -> (&str, u16) {
        (self.local_addr.as_str(), self.local_port)
    }

    /// Remote server, as a `(host, port)` pair.
    pub fn remote_target(&self) -> (&str, u16) {
        (self.server_addr.as_str(), self.server_port)
    }

    /// Printable relay address (`host:port`, IPv6 hosts bracketed).
    pub fn relay_address(&self) -> String {
        join_host_port(&self.local_addr, self.local_port)
    }

    /// Printable remote address.
    pub fn remote_address(&self) -> String {
        join_host_port(&self.server_addr, self.server_port)
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

// Password is redacted so descriptors can be logged with `?`.
impl fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("index", &self.index)
            .field("server", &self.remote_address())
            .field("local", &self.relay_address())
            .field("method", &self.method)
            .field("password", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}

impl fmt::Display for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} -> {}",
            self.index,
            self.relay_address(),
            self.remote_address()
        )
    }
}

#[cfg(test)]
pub(crate) fn test_descriptor(index: usize, local_port: u16) -> BackendDescriptor {
    BackendDescriptor {
        index,
        server_addr: "203.0.113.10".to_string(),
        server_port: 8388,
        local_addr: "127.0.0.1".to_string(),
        local_port,
        method: "aes-256-gcm".to_string(),
        password: "hunter2".to_string(),
        timeout_secs: 600,
        cooldown: Duration::from_secs(600),
    }
}
