use crate::process::{ProcessHandle, ProcessManager, ProcessStatus, TerminationResult};
use crate::sink::{LogRecord, LogSink};
use crate::supervisor::{ProcessState, SupervisedProcess};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(2);

/// Graceful-then-forced termination with a bounded wait.
///
/// The sequence never hangs on a child it cannot kill: whatever the
/// termination calls report, the handle is released and the process ends
/// up `Stopped`.
pub struct ShutdownCoordinator {
    manager: Arc<dyn ProcessManager>,
    sink: Arc<dyn LogSink>,
    kill_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(manager: Arc<dyn ProcessManager>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            manager,
            sink,
            kill_timeout: DEFAULT_KILL_TIMEOUT,
        }
    }

    /// Bound on each termination request and on reaping the child after
    /// the forced kill
    pub fn with_kill_timeout(mut self, kill_timeout: Duration) -> Self {
        self.kill_timeout = kill_timeout;
        self
    }

    /// Stop `process`, giving it `grace_period` to exit on its own.
    /// A no-op unless the process is `Running`.
    pub async fn stop(&self, process: &SupervisedProcess, grace_period: Duration) {
        let state = process.state();
        if state != ProcessState::Running
            || !process.transition(&[ProcessState::Running], ProcessState::Stopping)
        {
            debug!(state = %state, "Stop ignored");
            return;
        }
        process.cancel_monitor();

        let binary = process.binary_path().display().to_string();
        let pid = process.describe_pid();
        self.sink
            .emit(LogRecord::info(format!("stopping {binary} (pid {pid})")));

        let mut slot = process.handle_slot().lock().await;
        let mut status: Option<ProcessStatus> = None;

        if let Some(handle) = slot.as_mut() {
            let handle: &mut dyn ProcessHandle = &mut **handle;
            let graceful = self
                .bounded(self.manager.terminate_gracefully(handle))
                .await;
            let failure = if graceful.is_ok() {
                match tokio::time::timeout(grace_period, handle.wait()).await {
                    Ok(Ok(exited)) => {
                        status = Some(exited);
                        None
                    }
                    Ok(Err(e)) => Some(format!("waiting for exit failed: {e}")),
                    Err(_) => Some(format!("no exit within {grace_period:?}")),
                }
            } else {
                Some(format!("termination request failed: {graceful:?}"))
            };

            let escalate = failure.is_some();
            if let Some(reason) = failure {
                self.sink.emit(LogRecord::warning(format!(
                    "graceful shutdown failed, forcing termination of pid {pid}: {reason}"
                )));
            }

            let alive = match status {
                Some(_) => false,
                None => match handle.try_wait().await {
                    Ok(Some(exited)) => {
                        status = Some(exited);
                        false
                    }
                    Ok(None) | Err(_) => true,
                },
            };

            // After any graceful failure the kill is sent even if the child
            // has exited meanwhile; killing an exited child is a no-op.
            if escalate || alive {
                match self.bounded(self.manager.force_kill(handle)).await {
                    TerminationResult::Success | TerminationResult::ProcessNotFound => {}
                    failed => {
                        self.sink.emit(LogRecord::error(format!(
                            "forced termination of pid {pid} failed: {failed:?}; releasing handle"
                        )));
                    }
                }

                if status.is_none() {
                    match tokio::time::timeout(self.kill_timeout, handle.wait()).await {
                        Ok(Ok(exited)) => status = Some(exited),
                        Ok(Err(e)) => warn!(pid = %pid, error = %e, "Reaping killed child failed"),
                        Err(_) => warn!(pid = %pid, "Killed child was not reaped in time"),
                    }
                }
            }
        }

        *slot = None;
        drop(slot);

        if let Some(code) = status.and_then(|s| s.code()) {
            process.set_exit_code(code);
        }
        process.force_state(ProcessState::Stopped);

        info!(pid = %pid, status = ?status, "Supervised process stopped");
        self.sink
            .emit(LogRecord::info(format!("stopped {binary} (pid {pid})")));
    }

    /// Platform termination calls may block on the OS; give up after `kill_timeout`
    async fn bounded(&self, request: impl Future<Output = TerminationResult>) -> TerminationResult {
        match tokio::time::timeout(self.kill_timeout, request).await {
            Ok(result) => result,
            Err(_) => TerminationResult::Failed(format!(
                "no answer within {:?}",
                self.kill_timeout
            )),
        }
    }
}
