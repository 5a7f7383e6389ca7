//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ss_cluster_connections_total` (counter): accepted clients by outcome
//! - `ss_cluster_active_connections` (gauge): relays in flight
//! - `ss_cluster_backend_healthy` (gauge): 1=healthy, 0=in cooldown
//! - `ss_cluster_worker_failures_total` (counter): worker failure signals
//! - `ss_cluster_bytes_total` (counter): relayed bytes by direction
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// How an accepted client connection ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Relayed,
    RelayFailed,
    NoHealthyBackend,
    DialFailed,
    Rejected,
}

impl ConnectionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionOutcome::Relayed => "relayed",
            ConnectionOutcome::RelayFailed => "relay_failed",
            ConnectionOutcome::NoHealthyBackend => "no_healthy_backend",
            ConnectionOutcome::DialFailed => "dial_failed",
            ConnectionOutcome::Rejected => "rejected",
        }
    }
}

pub fn record_connection(outcome: ConnectionOutcome) {
    metrics::counter!("ss_cluster_connections_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn set_active_connections(count: u64) {
    metrics::gauge!("ss_cluster_active_connections").set(count as f64);
}

pub fn record_backend_health(backend: usize, healthy: bool) {
    metrics::gauge!("ss_cluster_backend_healthy", "backend" => backend.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_worker_failure(backend: usize) {
    metrics::counter!("ss_cluster_worker_failures_total", "backend" => backend.to_string())
        .increment(1);
}

pub fn record_bytes(to_backend: u64, from_backend: u64) {
    metrics::counter!("ss_cluster_bytes_total", "direction" => "to_backend").increment(to_backend);
    metrics::counter!("ss_cluster_bytes_total", "direction" => "from_backend").increment(from_backend);
}
