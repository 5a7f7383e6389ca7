//! Out-of-band worker failure signals.
//!
//! Workers report failures of their own outbound connections (to the remote
//! server) on a channel separate from the relay path. Process workers do it
//! by printing a JSON object with an `error` field, e.g.
//! `{"error":"clientToRemoteError"}`, on stdout or stderr.

use serde::Deserialize;
use tokio::sync::mpsc;

/// Failure kind reported when a worker cannot reach its remote server.
pub const CLIENT_TO_REMOTE_ERROR: &str = "clientToRemoteError";

/// A failure reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    pub kind: String,
}

impl WorkerFailure {
    pub fn client_to_remote() -> Self {
        Self {
            kind: CLIENT_TO_REMOTE_ERROR.to_string(),
        }
    }
}

/// Worker index plus the failure it reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSignal {
    pub index: usize,
    pub failure: WorkerFailure,
}

pub type SignalSender = mpsc::UnboundedSender<WorkerSignal>;
pub type SignalReceiver = mpsc::UnboundedReceiver<WorkerSignal>;

pub fn channel() -> (SignalSender, SignalReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Deserialize)]
struct FailureEvent {
    error: String,
}

/// Parse one line of worker output. Anything that is not a JSON object with
/// a string `error` field is ordinary log output.
pub fn parse_failure_line(line: &str) -> Option<WorkerFailure> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }
    serde_json::from_str::<FailureEvent>(line)
        .ok()
        .filter(|event| !event.error.is_empty())
        .map(|event| WorkerFailure { kind: event.error })
}
