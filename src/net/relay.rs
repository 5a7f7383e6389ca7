//! Health-aware connection relay.
//!
//! # Responsibilities
//! - Accept clients on the public listener
//! - Pick a healthy backend uniformly at random per connection
//! - Dial the backend's relay address; withdraw it on dial failure
//! - Splice client and backend until either side closes or errors
//!
//! Every connection runs in its own task; nothing that happens on one
//! connection can close or reroute another.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::config::RelayConfig;
use crate::health::HealthTracker;
use crate::load_balancer::{BackendRegistry, LoadBalancer, RandomSelection};
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::net::splice::splice;
use crate::observability::metrics::{self, ConnectionOutcome};
use crate::resilience::timeouts::connect_with_timeout;

/// Drain window used when none is configured.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a connection task needs, shared across tasks.
#[derive(Debug)]
struct RelayContext {
    registry: Arc<BackendRegistry>,
    health: Arc<HealthTracker>,
    balancer: Box<dyn LoadBalancer>,
    connect_timeout: Duration,
    retry_on_dial_failure: bool,
}

/// The public-facing load balancer.
pub struct ConnectionRelay {
    listener: Listener,
    context: RelayContext,
    connections: ConnectionTracker,
    drain_timeout: Duration,
}

impl ConnectionRelay {
    pub fn new(
        listener: Listener,
        registry: Arc<BackendRegistry>,
        health: Arc<HealthTracker>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            listener,
            context: RelayContext {
                registry,
                health,
                balancer: Box::new(RandomSelection::new()),
                connect_timeout: Duration::from_millis(config.connect_timeout_ms),
                retry_on_dial_failure: config.retry_on_dial_failure,
            },
            connections: ConnectionTracker::new(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Replace the selection strategy.
    pub fn with_balancer(mut self, balancer: Box<dyn LoadBalancer>) -> Self {
        self.context.balancer = balancer;
        self
    }

    /// How long `run` waits for in-flight relays after shutdown.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle onto the in-flight connection count.
    pub fn connections(&self) -> ConnectionTracker {
        self.connections.clone()
    }

    /// Accept and relay connections until shutdown, then drain.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ListenerError> {
        let Self {
            listener,
            context,
            connections,
            drain_timeout,
        } = self;
        let context = Arc::new(context);

        let local_addr = listener.local_addr().map_err(ListenerError::Accept)?;
        tracing::info!(
            address = %local_addr,
            backends = context.registry.count(),
            "Relay accepting connections"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => dispatch(&listener, &connections, &context, stream, peer),
                    Err(e) => {
                        tracing::error!(error = %e, "Accept error");
                        // Avoid a tight loop on persistent errors (e.g. EMFILE).
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Relay received shutdown signal, no longer accepting");
                    break;
                }
            }
        }
        drop(listener);

        let in_flight = connections.active_count();
        if in_flight > 0 {
            tracing::info!(in_flight, "Waiting for relays to drain");
            if !connections.wait_for_drain(drain_timeout).await {
                tracing::warn!(
                    remaining = connections.active_count(),
                    "Drain timeout elapsed, abandoning open relays"
                );
            }
        }

        Ok(())
    }
}

fn dispatch(
    listener: &Listener,
    connections: &ConnectionTracker,
    context: &Arc<RelayContext>,
    client: TcpStream,
    peer: SocketAddr,
) {
    let Some(permit) = listener.try_admit() else {
        metrics::record_connection(ConnectionOutcome::Rejected);
        tracing::warn!(peer = %peer, "Connection rejected: max connections reached");
        return;
    };

    let guard = connections.track();
    let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);
    let context = Arc::clone(context);

    tokio::spawn(
        async move {
            let outcome = context.handle(client).await;
            metrics::record_connection(outcome);
            drop(permit);
            drop(guard);
        }
        .instrument(span),
    );
}

impl RelayContext {
    async fn handle(&self, mut client: TcpStream) -> ConnectionOutcome {
        let healthy = self.health.healthy_subset(self.registry.list());
        let Some(index) = self.balancer.next_backend(&healthy) else {
            tracing::warn!("No healthy backend, closing client");
            return ConnectionOutcome::NoHealthyBackend;
        };

        let (index, mut upstream) = match self.dial(index).await {
            Ok(stream) => (index, stream),
            Err(_) if self.retry_on_dial_failure => match self.retry_dial(index).await {
                Some(connected) => connected,
                None => return ConnectionOutcome::DialFailed,
            },
            Err(_) => return ConnectionOutcome::DialFailed,
        };

        tracing::debug!(backend = index, "Relaying to backend");

        match splice(&mut client, &mut upstream).await {
            Ok((to_backend, from_backend)) => {
                metrics::record_bytes(to_backend, from_backend);
                tracing::debug!(
                    backend = index,
                    bytes_to_backend = to_backend,
                    bytes_from_backend = from_backend,
                    "Relay finished"
                );
                ConnectionOutcome::Relayed
            }
            Err(e) => {
                let withdrawn = self.health.record_relay_failure(index);
                tracing::debug!(backend = index, error = %e, withdrawn, "Relay failed");
                ConnectionOutcome::RelayFailed
            }
        }
    }

    /// Second attempt against a different backend. The failed one has
    /// already been withdrawn, but it is filtered explicitly in case it
    /// recovered in between.
    async fn retry_dial(&self, failed: usize) -> Option<(usize, TcpStream)> {
        let healthy: Vec<usize> = self
            .health
            .healthy_subset(self.registry.list())
            .into_iter()
            .filter(|index| *index != failed)
            .collect();
        let index = self.balancer.next_backend(&healthy)?;
        tracing::debug!(failed, retry = index, "Retrying dial on another backend");
        self.dial(index).await.ok().map(|stream| (index, stream))
    }

    async fn dial(&self, index: usize) -> io::Result<TcpStream> {
        let backend = self
            .registry
            .get(index)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown backend"))?;

        match connect_with_timeout(backend.relay_target(), self.connect_timeout).await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                tracing::warn!(
                    backend = index,
                    relay = %backend.relay_address(),
                    error = %e,
                    "Dial to worker failed"
                );
                self.health.record_dial_failure(index);
                Err(e)
            }
        }
    }
}
