use crate::sink::{LogRecord, LogSink};
use crate::supervisor::{ProcessState, SupervisedProcess};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

enum Poll {
    Alive,
    Done,
}

/// Polls a running child on a fixed interval and reports exits nobody asked for
pub struct HealthMonitor {
    interval: Duration,
    sink: Arc<dyn LogSink>,
}

impl HealthMonitor {
    pub fn new(interval: Duration, sink: Arc<dyn LogSink>) -> Self {
        Self { interval, sink }
    }

    pub fn spawn(self, process: SupervisedProcess, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(&process, cancel).await })
    }

    /// Poll until the process leaves `Running` or `cancel` fires
    pub async fn run(&self, process: &SupervisedProcess, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(pid = ?process.pid(), "Health monitor cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            if process.state() != ProcessState::Running {
                break;
            }

            if let Poll::Done = self.poll_once(process).await {
                break;
            }
        }
    }

    async fn poll_once(&self, process: &SupervisedProcess) -> Poll {
        let mut slot = process.handle_slot().lock().await;

        // Stop may have flipped the state while we waited for the slot
        if process.state() != ProcessState::Running {
            return Poll::Done;
        }
        let Some(handle) = slot.as_mut() else {
            return Poll::Done;
        };

        match handle.try_wait().await {
            Ok(None) => Poll::Alive,
            Ok(Some(status)) => {
                if let Some(code) = status.code() {
                    process.set_exit_code(code);
                }
                if !process.transition(&[ProcessState::Running], ProcessState::Failed) {
                    return Poll::Done;
                }
                *slot = None;

                self.sink.emit(LogRecord::error(format!(
                    "unexpected termination of {} (pid {}): {status}",
                    process.binary_path().display(),
                    process.describe_pid()
                )));
                Poll::Done
            }
            Err(e) => {
                warn!(pid = ?process.pid(), error = %e, "Liveness check failed");
                Poll::Alive
            }
        }
    }
}
