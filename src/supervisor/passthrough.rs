//! In-process passthrough workers.
//!
//! Each worker is a task that listens on the backend's relay address and
//! forwards bytes unmodified to the remote server. No encryption; useful for
//! plain TCP fan-out and for exercising the cluster without external
//! binaries. A failed outbound connect is reported as a failure signal.
//! In-flight forwards belong to the worker and stop with it.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use crate::load_balancer::BackendDescriptor;
use crate::net::splice::splice;
use crate::observability::metrics;
use crate::resilience::timeouts::connect_with_timeout;
use crate::supervisor::signal::{SignalSender, WorkerFailure, WorkerSignal};
use crate::supervisor::worker::{Liveness, LivenessCell, SupervisorError, WorkerHandle, WorkerLauncher};

/// Launches passthrough worker tasks.
#[derive(Debug, Clone)]
pub struct PassthroughLauncher {
    connect_timeout: Duration,
}

impl PassthroughLauncher {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl WorkerLauncher for PassthroughLauncher {
    fn kind(&self) -> &'static str {
        "passthrough"
    }

    fn launch(&self, backend: &BackendDescriptor, signals: SignalSender) -> Result<WorkerHandle, SupervisorError> {
        let index = backend.index;
        let bind_error = |source| SupervisorError::Bind {
            index,
            address: backend.relay_address(),
            source,
        };

        // Bind synchronously so a taken port fails startup right here.
        let std_listener = std::net::TcpListener::bind(backend.relay_target()).map_err(bind_error)?;
        std_listener.set_nonblocking(true).map_err(bind_error)?;
        let listener = TcpListener::from_std(std_listener).map_err(bind_error)?;

        let liveness = LivenessCell::new();
        liveness.set(Liveness::Running);

        tracing::info!(
            backend = index,
            relay = %backend.relay_address(),
            remote = %backend.remote_address(),
            "Passthrough worker started"
        );

        let remote = (backend.server_addr.clone(), backend.server_port);
        let connect_timeout = self.connect_timeout;
        let task = tokio::spawn(async move {
            // Owned by the accept task: stopping the worker drops its forwards.
            let mut forwards = JoinSet::new();
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((inbound, _)) => {
                            forwards.spawn(forward(
                                index,
                                inbound,
                                remote.clone(),
                                connect_timeout,
                                signals.clone(),
                            ));
                        }
                        Err(e) => {
                            tracing::warn!(backend = index, error = %e, "Worker accept error");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    },
                    Some(_) = forwards.join_next(), if !forwards.is_empty() => {}
                }
            }
        });

        Ok(WorkerHandle::new(backend, self.kind(), None, liveness, task))
    }
}

async fn forward(
    index: usize,
    mut inbound: TcpStream,
    remote: (String, u16),
    connect_timeout: Duration,
    signals: SignalSender,
) {
    let mut outbound = match connect_with_timeout((remote.0.as_str(), remote.1), connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(
                backend = index,
                remote = %format!("{}:{}", remote.0, remote.1),
                error = %e,
                "Worker could not reach remote server"
            );
            metrics::record_worker_failure(index);
            let _ = signals.send(WorkerSignal {
                index,
                failure: WorkerFailure::client_to_remote(),
            });
            return;
        }
    };

    if let Err(e) = splice(&mut inbound, &mut outbound).await {
        tracing::debug!(backend = index, error = %e, "Worker relay closed with error");
    }
}
