//! Worker supervision subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     descriptors[0..n] → launcher.launch(descriptors[i]) → WorkerHandle i
//!     (any failure stops the workers already started and aborts startup)
//!
//! Runtime:
//!     worker failure event → signal channel → WorkerSupervisor::run
//!         → on_failure_signal(index) → HealthTracker::report_unhealthy(index)
//! ```
//!
//! # Design Decisions
//! - One worker per backend, never restarted; a dead worker's backend is
//!   withdrawn by dial failures like any other unreachable relay address
//! - Workers own their lifecycle task; stopping a handle stops the worker

pub mod passthrough;
pub mod process;
pub mod signal;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::{WorkerConfig, WorkerKind};
use crate::health::HealthTracker;
use crate::load_balancer::BackendDescriptor;

pub use passthrough::PassthroughLauncher;
pub use process::ProcessLauncher;
pub use signal::{SignalReceiver, SignalSender, WorkerFailure, WorkerSignal};
pub use worker::{Liveness, SupervisorError, WorkerHandle, WorkerLauncher};

/// Build the launcher selected in the worker config.
pub fn launcher_for(config: &WorkerConfig, connect_timeout: Duration) -> Box<dyn WorkerLauncher> {
    match config.kind {
        WorkerKind::Process => Box::new(ProcessLauncher::from_config(config)),
        WorkerKind::Passthrough => Box::new(PassthroughLauncher::new(connect_timeout)),
    }
}

/// Owns the worker pool and routes worker failure signals to health tracking.
pub struct WorkerSupervisor {
    health: Arc<HealthTracker>,
    workers: Vec<WorkerHandle>,
    signals_tx: SignalSender,
    signals_rx: SignalReceiver,
}

impl WorkerSupervisor {
    /// Start one worker per descriptor, in order. Worker `i` serves
    /// `backends[i]`. Fails without leaving a partial pool.
    pub fn start(
        backends: &[BackendDescriptor],
        launcher: &dyn WorkerLauncher,
        health: Arc<HealthTracker>,
    ) -> Result<Self, SupervisorError> {
        let (signals_tx, signals_rx) = signal::channel();
        let mut workers: Vec<WorkerHandle> = Vec::with_capacity(backends.len());

        tracing::info!(
            workers = backends.len(),
            kind = launcher.kind(),
            "Starting workers"
        );

        for backend in backends {
            match launcher.launch(backend, signals_tx.clone()) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    tracing::error!(backend = backend.index, error = %e, "Worker failed to start");
                    for worker in &workers {
                        worker.stop();
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            health,
            workers,
            signals_tx,
            signals_rx,
        })
    }

    /// Worker handles, in descriptor order.
    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    /// Sender for injecting failure signals from outside a worker.
    pub fn signal_sender(&self) -> SignalSender {
        self.signals_tx.clone()
    }

    /// A worker reported that its outbound connection failed.
    pub fn on_failure_signal(&self, index: usize) {
        self.health.report_unhealthy(index);
    }

    /// Process failure signals until shutdown, then stop every worker.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                Some(signal) = self.signals_rx.recv() => {
                    tracing::warn!(
                        backend = signal.index,
                        failure = %signal.failure.kind,
                        "Worker reported failure"
                    );
                    self.on_failure_signal(signal.index);
                }
                _ = shutdown.recv() => {
                    tracing::info!("Supervisor received shutdown signal");
                    break;
                }
            }
        }
        self.stop_all();
    }

    /// Stop every worker.
    pub fn stop_all(&self) {
        for worker in &self.workers {
            worker.stop();
        }
        tracing::info!(workers = self.workers.len(), "Workers stopped");
    }
}

impl Drop for WorkerSupervisor {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailurePolicy;
    use crate::load_balancer::backend::test_descriptor;
    use crate::load_balancer::BackendRegistry;
    use crate::supervisor::worker::LivenessCell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Launcher that records launch order and fails at a chosen index.
    struct ScriptedLauncher {
        fail_at: Option<usize>,
        launched: Mutex<Vec<usize>>,
        live: Arc<AtomicUsize>,
    }

    impl ScriptedLauncher {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                fail_at,
                launched: Mutex::new(Vec::new()),
                live: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    struct LiveGuard(Arc<AtomicUsize>);

    impl Drop for LiveGuard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl WorkerLauncher for ScriptedLauncher {
        fn kind(&self) -> &'static str {
            "scripted"
        }

        fn launch(&self, backend: &BackendDescriptor, _signals: SignalSender) -> Result<WorkerHandle, SupervisorError> {
            if self.fail_at == Some(backend.index) {
                return Err(SupervisorError::Spawn {
                    index: backend.index,
                    command: "scripted".into(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such worker"),
                });
            }
            self.launched.lock().unwrap().push(backend.index);
            self.live.fetch_add(1, Ordering::SeqCst);
            let guard = LiveGuard(Arc::clone(&self.live));
            let task = tokio::spawn(async move {
                let _guard = guard;
                std::future::pending::<()>().await;
            });
            let liveness = LivenessCell::new();
            liveness.set(Liveness::Running);
            Ok(WorkerHandle::new(backend, self.kind(), None, liveness, task))
        }
    }

    fn setup(n: usize) -> (BackendRegistry, Arc<HealthTracker>) {
        let registry = BackendRegistry::new((0..n).map(|i| test_descriptor(i, 10801 + i as u16)).collect()).unwrap();
        let health = Arc::new(HealthTracker::new(&registry, FailurePolicy::DialOnly));
        (registry, health)
    }

    #[tokio::test]
    async fn workers_follow_descriptor_order() {
        let (registry, health) = setup(3);
        let launcher = ScriptedLauncher::new(None);

        let supervisor = WorkerSupervisor::start(registry.list(), &launcher, health).unwrap();

        assert_eq!(*launcher.launched.lock().unwrap(), vec![0, 1, 2]);
        let indices: Vec<usize> = supervisor.workers().iter().map(|w| w.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(supervisor.workers()[1].relay_address(), "127.0.0.1:10802");
    }

    #[tokio::test]
    async fn spawn_failure_leaves_no_partial_pool() {
        let (registry, health) = setup(3);
        let launcher = ScriptedLauncher::new(Some(2));

        let result = WorkerSupervisor::start(registry.list(), &launcher, health);
        assert!(matches!(result, Err(SupervisorError::Spawn { index: 2, .. })));

        // Aborted tasks drop their guards once the runtime polls them.
        for _ in 0..50 {
            if launcher.live.load(Ordering::SeqCst) == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(launcher.live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_signal_marks_backend_unhealthy() {
        let (registry, health) = setup(3);
        let launcher = ScriptedLauncher::new(None);
        let supervisor = WorkerSupervisor::start(registry.list(), &launcher, Arc::clone(&health)).unwrap();

        let signals = supervisor.signal_sender();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let run = tokio::spawn(supervisor.run(shutdown_rx));

        signals
            .send(WorkerSignal {
                index: 1,
                failure: WorkerFailure::client_to_remote(),
            })
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while health.is_healthy(1) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(health.healthy_subset(registry.list()), vec![0, 2]);

        shutdown_tx.send(()).unwrap();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn on_failure_signal_forwards_directly() {
        let (registry, health) = setup(2);
        let launcher = ScriptedLauncher::new(None);
        let supervisor = WorkerSupervisor::start(registry.list(), &launcher, Arc::clone(&health)).unwrap();

        supervisor.on_failure_signal(0);
        assert_eq!(health.healthy_subset(registry.list()), vec![1]);
    }
}
