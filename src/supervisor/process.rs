//! External-process workers.
//!
//! Spawns one child per backend from an argv template, watches its output
//! for failure events and records when it exits. Children are killed when
//! their handle is stopped or the supervisor is dropped.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::config::WorkerConfig;
use crate::load_balancer::BackendDescriptor;
use crate::observability::metrics;
use crate::supervisor::signal::{parse_failure_line, SignalSender, WorkerSignal};
use crate::supervisor::worker::{Liveness, LivenessCell, SupervisorError, WorkerHandle, WorkerLauncher};

/// Launches workers as child processes.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    command: String,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }

    /// Substitute the backend's fields into the argument template.
    pub fn render_args(&self, backend: &BackendDescriptor) -> Vec<String> {
        let fields = [
            ("{server_addr}", backend.server_addr.clone()),
            ("{server_port}", backend.server_port.to_string()),
            ("{local_addr}", backend.local_addr.clone()),
            ("{local_port}", backend.local_port.to_string()),
            ("{method}", backend.method.clone()),
            ("{password}", backend.password.clone()),
            ("{timeout}", backend.timeout_secs.to_string()),
            ("{index}", backend.index.to_string()),
        ];

        self.args
            .iter()
            .map(|arg| {
                fields
                    .iter()
                    .fold(arg.clone(), |acc, (placeholder, value)| acc.replace(placeholder, value))
            })
            .collect()
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn kind(&self) -> &'static str {
        "process"
    }

    fn launch(&self, backend: &BackendDescriptor, signals: SignalSender) -> Result<WorkerHandle, SupervisorError> {
        let index = backend.index;

        let mut child = Command::new(&self.command)
            .args(self.render_args(backend))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                index,
                command: self.command.clone(),
                source,
            })?;

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let liveness = LivenessCell::new();
        liveness.set(Liveness::Running);

        tracing::info!(
            backend = index,
            pid = ?pid,
            command = %self.command,
            relay = %backend.relay_address(),
            remote = %backend.remote_address(),
            "Worker process started"
        );

        let task_liveness = liveness.clone();
        let task = tokio::spawn(async move {
            let (status, _, _) = tokio::join!(
                child.wait(),
                pump_output(index, stdout, signals.clone()),
                pump_output(index, stderr, signals),
            );
            task_liveness.set(Liveness::Exited);
            match status {
                Ok(status) => tracing::error!(backend = index, %status, "Worker process exited"),
                Err(e) => tracing::error!(backend = index, error = %e, "Failed to wait on worker process"),
            }
        });

        Ok(WorkerHandle::new(backend, self.kind(), pid, liveness, task))
    }
}

/// Forward worker output to the log, turning failure events into signals.
async fn pump_output<R>(index: usize, output: Option<R>, signals: SignalSender)
where
    R: AsyncRead + Unpin,
{
    let Some(output) = output else {
        return;
    };

    let mut lines = BufReader::new(output).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_failure_line(&line) {
                Some(failure) => {
                    metrics::record_worker_failure(index);
                    let _ = signals.send(WorkerSignal { index, failure });
                }
                None => tracing::debug!(backend = index, output = %line, "Worker output"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(backend = index, error = %e, "Worker output stream closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::backend::test_descriptor;
    use crate::supervisor::signal;

    #[test]
    fn renders_default_ss_local_template() {
        let launcher = ProcessLauncher::from_config(&WorkerConfig::default());
        let args = launcher.render_args(&test_descriptor(3, 10804));
        assert_eq!(
            args,
            vec![
                "-s", "203.0.113.10", "-p", "8388", "-b", "127.0.0.1", "-l", "10804", "-k", "hunter2",
                "-m", "aes-256-gcm", "-t", "600",
            ]
        );
    }

    #[test]
    fn placeholders_can_share_an_argument() {
        let launcher = ProcessLauncher::new("worker", vec!["--bind={local_addr}:{local_port}#{index}".into()]);
        assert_eq!(
            launcher.render_args(&test_descriptor(1, 10802)),
            vec!["--bind=127.0.0.1:10802#1"]
        );
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let launcher = ProcessLauncher::new("/nonexistent/ss-local", Vec::new());
        let (tx, _rx) = signal::channel();
        let err = launcher.launch(&test_descriptor(0, 10801), tx).unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { index: 0, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failure_lines_become_signals() {
        let launcher = ProcessLauncher::new(
            "sh",
            vec![
                "-c".into(),
                r#"echo "listening on {local_port}"; echo '{"error":"clientToRemoteError"}' >&2; sleep 30"#.into(),
            ],
        );
        let (tx, mut rx) = signal::channel();
        let handle = launcher.launch(&test_descriptor(4, 10805), tx).unwrap();
        assert!(handle.pid().is_some());

        let received = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.index, 4);
        assert_eq!(received.failure.kind, "clientToRemoteError");

        handle.stop();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_is_recorded() {
        let launcher = ProcessLauncher::new("sh", vec!["-c".into(), "exit 3".into()]);
        let (tx, _rx) = signal::channel();
        let handle = launcher.launch(&test_descriptor(0, 10801), tx).unwrap();

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while handle.is_alive() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(handle.liveness(), Liveness::Exited);
    }
}
