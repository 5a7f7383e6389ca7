//! Worker handles and the launcher seam.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::load_balancer::BackendDescriptor;
use crate::supervisor::signal::SignalSender;

/// Error type for worker startup.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("worker #{index}: failed to spawn {command:?}: {source}")]
    Spawn {
        index: usize,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker #{index}: failed to bind relay address {address}: {source}")]
    Bind {
        index: usize,
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Last-known liveness of a worker.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Starting = 0,
    Running = 1,
    Exited = 2,
}

impl From<u8> for Liveness {
    fn from(val: u8) -> Self {
        match val {
            1 => Liveness::Running,
            2 => Liveness::Exited,
            _ => Liveness::Starting,
        }
    }
}

/// Liveness shared between a handle and the task watching the worker.
#[derive(Debug, Clone)]
pub struct LivenessCell(Arc<AtomicU8>);

impl LivenessCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(Liveness::Starting as u8)))
    }

    pub fn set(&self, liveness: Liveness) {
        self.0.store(liveness as u8, Ordering::Release);
    }

    pub fn get(&self) -> Liveness {
        Liveness::from(self.0.load(Ordering::Acquire))
    }
}

impl Default for LivenessCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts the worker for one backend.
///
/// A launcher must bind or spawn synchronously enough that a returned `Ok`
/// means the worker exists; readiness of the relay port is not awaited.
pub trait WorkerLauncher: Send + Sync {
    /// Short label for logs (`process`, `passthrough`).
    fn kind(&self) -> &'static str;

    /// Start the worker serving `backend`. Failures it observes on its
    /// outbound connections are sent on `signals`.
    fn launch(&self, backend: &BackendDescriptor, signals: SignalSender) -> Result<WorkerHandle, SupervisorError>;
}

/// A running worker, tied 1:1 to a backend descriptor by index.
pub struct WorkerHandle {
    index: usize,
    kind: &'static str,
    relay_address: String,
    pid: Option<u32>,
    liveness: LivenessCell,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Wrap the task that owns the worker. Aborting that task must stop the
    /// worker (e.g. by dropping a `kill_on_drop` child).
    pub fn new(
        backend: &BackendDescriptor,
        kind: &'static str,
        pid: Option<u32>,
        liveness: LivenessCell,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            index: backend.index,
            kind,
            relay_address: backend.relay_address(),
            pid,
            liveness,
            task,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn relay_address(&self) -> &str {
        &self.relay_address
    }

    /// OS process id, for process workers.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.get()
    }

    pub fn is_alive(&self) -> bool {
        self.liveness.get() != Liveness::Exited && !self.task.is_finished()
    }

    /// Stop the worker.
    pub fn stop(&self) {
        self.task.abort();
        self.liveness.set(Liveness::Exited);
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("index", &self.index)
            .field("kind", &self.kind)
            .field("relay_address", &self.relay_address)
            .field("pid", &self.pid)
            .field("liveness", &self.liveness.get())
            .finish()
    }
}
