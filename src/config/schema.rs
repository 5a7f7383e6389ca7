//! Configuration schema definitions.
//!
//! The runtime sections (`listener`, `relay`, `health`, `worker`,
//! `observability`) use snake_case keys. Server entries keep the camelCase
//! keys of the legacy ss-cluster JSON layout so existing config files load
//! unchanged.

use serde::{Deserialize, Serialize};

/// Root configuration for the cluster.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClusterConfig {
    /// Public listener settings.
    pub listener: ListenerConfig,

    /// Relay (dial + splice) settings.
    pub relay: RelayConfig,

    /// Backend health / cooldown settings.
    pub health: HealthConfig,

    /// How workers are launched.
    pub worker: WorkerConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Values merged under every server entry.
    pub default: ServerConfig,

    /// Remote servers, one worker each, in order.
    pub servers: Vec<ServerConfig>,
}

/// Public listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:1080").
    pub bind_address: String,

    /// Maximum concurrent relayed connections. Extra clients are closed.
    pub max_connections: usize,

    /// Seconds in-flight relays may keep running after shutdown is signalled.
    pub drain_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:1080".to_string(),
            max_connections: 10_000,
            drain_timeout_secs: 10,
        }
    }
}

/// Relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Timeout for dialing a worker's relay address, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Retry once against a different healthy backend when a dial fails.
    pub retry_on_dial_failure: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            retry_on_dial_failure: false,
        }
    }
}

/// Which relay failures withdraw a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Only failing to dial the worker marks it unhealthy.
    #[default]
    DialOnly,
    /// Any I/O error on an established relay also marks it unhealthy.
    AnyRelayError,
}

/// Health tracking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Seconds a backend stays excluded after being marked unhealthy.
    pub cooldown_secs: u64,

    /// Relay failure policy.
    pub failure_policy: FailurePolicy,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 600,
            failure_policy: FailurePolicy::DialOnly,
        }
    }
}

/// Worker implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    /// External process per backend (e.g. `ss-local`).
    #[default]
    Process,
    /// In-process plain TCP forwarder to the remote server.
    Passthrough,
}

/// Worker launch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker implementation.
    pub kind: WorkerKind,

    /// Program to spawn for `process` workers.
    pub command: String,

    /// Argument template. `{server_addr}`, `{server_port}`, `{local_addr}`,
    /// `{local_port}`, `{method}`, `{password}`, `{timeout}` and `{index}`
    /// are substituted per backend.
    pub args: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            kind: WorkerKind::Process,
            command: "ss-local".to_string(),
            args: [
                "-s", "{server_addr}",
                "-p", "{server_port}",
                "-b", "{local_addr}",
                "-l", "{local_port}",
                "-k", "{password}",
                "-m", "{method}",
                "-t", "{timeout}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// One remote server entry, before defaults are applied.
///
/// Every field is optional here; validation decides what is required.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub server_addr: Option<String>,
    pub server_port: Option<u16>,
    pub local_addr: Option<String>,
    pub local_port: Option<u16>,
    pub method: Option<String>,
    pub password: Option<String>,

    /// Worker idle timeout in seconds.
    pub timeout: Option<u64>,

    /// Per-server override of `health.cooldown_secs`.
    pub cooldown_secs: Option<u64>,
}

impl ServerConfig {
    /// Overlay this entry on top of `defaults`; fields set here win.
    pub fn merged_over(&self, defaults: &ServerConfig) -> ServerConfig {
        ServerConfig {
            server_addr: self.server_addr.clone().or_else(|| defaults.server_addr.clone()),
            server_port: self.server_port.or(defaults.server_port),
            local_addr: self.local_addr.clone().or_else(|| defaults.local_addr.clone()),
            local_port: self.local_port.or(defaults.local_port),
            method: self.method.clone().or_else(|| defaults.method.clone()),
            password: self.password.clone().or_else(|| defaults.password.clone()),
            timeout: self.timeout.or(defaults.timeout),
            cooldown_secs: self.cooldown_secs.or(defaults.cooldown_secs),
        }
    }
}
