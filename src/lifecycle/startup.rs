//! Startup orchestration.
//!
//! Order: registry → health tracker → workers → public listener → relay.
//! Any failure is fatal, and nothing later in the order has been started
//! when it happens: an empty backend list never opens the listener, and a
//! listener bind failure stops the workers already spawned.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::ClusterConfig;
use crate::health::HealthTracker;
use crate::lifecycle::Shutdown;
use crate::load_balancer::{BackendDescriptor, BackendRegistry, RegistryError};
use crate::net::{ConnectionRelay, Listener, ListenerError};
use crate::supervisor::{launcher_for, SupervisorError, WorkerLauncher, WorkerSupervisor};

/// Fatal startup (or listener) failure.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid backend list: {0}")]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// A started cluster: workers running, listener bound, not yet accepting.
pub struct Cluster {
    registry: Arc<BackendRegistry>,
    health: Arc<HealthTracker>,
    supervisor: WorkerSupervisor,
    relay: ConnectionRelay,
}

impl Cluster {
    /// Start with the launcher named in `config.worker`.
    pub async fn start(
        config: &ClusterConfig,
        backends: Vec<BackendDescriptor>,
    ) -> Result<Self, StartupError> {
        let launcher = launcher_for(
            &config.worker,
            Duration::from_millis(config.relay.connect_timeout_ms),
        );
        Self::start_with(config, backends, launcher.as_ref()).await
    }

    /// Start with an explicit launcher.
    pub async fn start_with(
        config: &ClusterConfig,
        backends: Vec<BackendDescriptor>,
        launcher: &dyn WorkerLauncher,
    ) -> Result<Self, StartupError> {
        let registry = Arc::new(BackendRegistry::new(backends)?);
        let health = Arc::new(HealthTracker::new(&registry, config.health.failure_policy));

        tracing::info!(
            backends = registry.count(),
            failure_policy = ?health.policy(),
            "Trying to start {} worker instances",
            registry.count()
        );

        let supervisor = WorkerSupervisor::start(registry.list(), launcher, Arc::clone(&health))?;

        // On error the supervisor is dropped here, which stops its workers.
        let listener = Listener::bind(&config.listener).await?;

        let relay = ConnectionRelay::new(
            listener,
            Arc::clone(&registry),
            Arc::clone(&health),
            &config.relay,
        )
        .with_drain_timeout(Duration::from_secs(config.listener.drain_timeout_secs));

        Ok(Self {
            registry,
            health,
            supervisor,
            relay,
        })
    }

    /// Address the public listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.relay.local_addr()
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn supervisor(&self) -> &WorkerSupervisor {
        &self.supervisor
    }

    /// Serve until `shutdown` fires. Workers are stopped on the way out.
    pub async fn run(self, shutdown: &Shutdown) -> Result<(), StartupError> {
        let Self {
            supervisor, relay, ..
        } = self;

        let supervisor_task = tokio::spawn(supervisor.run(shutdown.subscribe()));
        let result = relay.run(shutdown.subscribe()).await;

        // The relay only returns early on a listener error; make sure the
        // supervisor stops in that case too.
        shutdown.trigger();
        if let Err(e) = supervisor_task.await {
            tracing::error!(error = %e, "Supervisor task failed");
        }

        tracing::info!("Cluster stopped");
        result.map_err(StartupError::from)
    }
}
