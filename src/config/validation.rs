//! Configuration validation.
//!
//! # Responsibilities
//! - Apply the `default` section under every server entry
//! - Check each server has its remote, relay and credential fields
//! - Fill the worker timeout (600s) and the relay cooldown
//! - Sanity-check the runtime sections
//!
//! All errors are collected and returned together. Per server, only the
//! first missing group is reported.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::config::schema::{ClusterConfig, ServerConfig, WorkerKind};
use crate::load_balancer::backend::BackendDescriptor;

/// Worker idle timeout applied when a server leaves `timeout` unset.
pub const DEFAULT_WORKER_TIMEOUT_SECS: u64 = 600;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No defined servers in config file")]
    NoServers,

    #[error("server #{0} - serverAddr/serverPort not defined")]
    MissingServerAddress(usize),

    #[error("server #{0} - localAddr/localPort not defined")]
    MissingLocalAddress(usize),

    #[error("server #{0} - method not defined")]
    MissingMethod(usize),

    #[error("server #{0} - password not defined")]
    MissingPassword(usize),

    #[error("listener.bind_address {0:?} is not a socket address")]
    InvalidBindAddress(String),

    #[error("listener.max_connections must be greater than zero")]
    ZeroMaxConnections,

    #[error("health.cooldown_secs must be greater than zero")]
    ZeroCooldown,

    #[error("worker.command must be set for process workers")]
    EmptyWorkerCommand,
}

/// Validate `config` and produce the ordered backend descriptors.
pub fn validate_config(config: &ClusterConfig) -> Result<Vec<BackendDescriptor>, Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }
    if config.health.cooldown_secs == 0 {
        errors.push(ValidationError::ZeroCooldown);
    }
    if config.worker.kind == WorkerKind::Process && config.worker.command.trim().is_empty() {
        errors.push(ValidationError::EmptyWorkerCommand);
    }

    if config.servers.is_empty() {
        errors.push(ValidationError::NoServers);
        return Err(errors);
    }

    let mut backends = Vec::with_capacity(config.servers.len());
    let mut seen_relays = HashSet::new();

    for (index, server) in config.servers.iter().enumerate() {
        let merged = server.merged_over(&config.default);
        match describe(index, &merged, config.health.cooldown_secs) {
            Ok(descriptor) => {
                if !seen_relays.insert(descriptor.relay_address()) {
                    tracing::warn!(
                        backend = index,
                        relay = %descriptor.relay_address(),
                        "Relay address is shared with an earlier server"
                    );
                }
                backends.push(descriptor);
            }
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(backends)
    } else {
        Err(errors)
    }
}

fn describe(index: usize, server: &ServerConfig, cooldown_secs: u64) -> Result<BackendDescriptor, ValidationError> {
    let (server_addr, server_port) = match (non_empty(&server.server_addr), non_zero(server.server_port)) {
        (Some(addr), Some(port)) => (addr, port),
        _ => return Err(ValidationError::MissingServerAddress(index)),
    };
    let (local_addr, local_port) = match (non_empty(&server.local_addr), non_zero(server.local_port)) {
        (Some(addr), Some(port)) => (addr, port),
        _ => return Err(ValidationError::MissingLocalAddress(index)),
    };
    let method = non_empty(&server.method).ok_or(ValidationError::MissingMethod(index))?;
    let password = non_empty(&server.password).ok_or(ValidationError::MissingPassword(index))?;

    let timeout_secs = match server.timeout {
        Some(t) if t > 0 => t,
        _ => DEFAULT_WORKER_TIMEOUT_SECS,
    };
    let cooldown_secs = match server.cooldown_secs {
        Some(c) if c > 0 => c,
        _ => cooldown_secs,
    };

    Ok(BackendDescriptor {
        index,
        server_addr,
        server_port,
        local_addr,
        local_port,
        method,
        password,
        timeout_secs,
        cooldown: Duration::from_secs(cooldown_secs),
    })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

fn non_zero(port: Option<u16>) -> Option<u16> {
    port.filter(|p| *p != 0)
}
