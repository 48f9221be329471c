use crate::fallback::report_fatal;
use procward_core::{ProcessState, ProcessSupervisor, SupervisedProcess, SupervisorError};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// How a hosted run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceExit {
    /// Stopped on request
    Requested,
    /// The child could not be started
    StartFailed,
    /// The child exited on its own, with its exit code when it had one
    ChildExited(Option<i32>),
}

impl ServiceExit {
    /// Process exit code for the host
    pub fn exit_code(&self) -> u8 {
        match self {
            ServiceExit::Requested => 0,
            ServiceExit::StartFailed | ServiceExit::ChildExited(_) => 1,
        }
    }
}

/// Start/stop hooks a service host binds to, for one configuration path.
///
/// Every successful `on_start` owns a fresh [`SupervisedProcess`]; the
/// previous one must have reached `Stopped` or `Failed` first.
pub struct HostService {
    supervisor: ProcessSupervisor,
    config_path: PathBuf,
    current: Mutex<Option<SupervisedProcess>>,
}

impl HostService {
    pub fn new(supervisor: ProcessSupervisor, config_path: impl Into<PathBuf>) -> Self {
        Self {
            supervisor,
            config_path: config_path.into(),
            current: Mutex::new(None),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// The most recently started instance, if any
    pub async fn current(&self) -> Option<SupervisedProcess> {
        self.current.lock().await.clone()
    }

    pub async fn on_start(&self) -> Result<SupervisedProcess, SupervisorError> {
        let mut current = self.current.lock().await;
        if let Some(process) = current.as_ref() {
            let state = process.state();
            if !state.is_terminal() {
                warn!(state = %state, "Start requested while an instance is live");
                return Err(SupervisorError::AlreadyStarted(state));
            }
        }

        match self.supervisor.start(&self.config_path).await {
            Ok(process) => {
                *current = Some(process.clone());
                Ok(process)
            }
            Err(e) => {
                self.report_start_failure(&e);
                Err(e)
            }
        }
    }

    pub async fn on_stop(&self) {
        let process = self.current.lock().await.clone();
        match process {
            Some(process) => self.supervisor.stop(&process).await,
            None => info!("Stop requested before any start"),
        }
    }

    /// Start, then run until `shutdown` resolves or the child exits on its own
    pub async fn run_until<F>(&self, shutdown: F) -> ServiceExit
    where
        F: Future<Output = ()>,
    {
        let process = match self.on_start().await {
            Ok(process) => process,
            Err(_) => return ServiceExit::StartFailed,
        };

        tokio::select! {
            _ = shutdown => {
                info!("Shutdown requested");
                self.on_stop().await;
                ServiceExit::Requested
            }
            state = process.wait_terminal() => match state {
                ProcessState::Stopped => ServiceExit::Requested,
                _ => {
                    error!(
                        pid = ?process.pid(),
                        exit_code = ?process.exit_code(),
                        "Supervised process exited unexpectedly"
                    );
                    ServiceExit::ChildExited(process.exit_code())
                }
            },
        }
    }

    fn report_start_failure(&self, e: &SupervisorError) {
        error!(
            error = %e,
            configuration = e.is_configuration_error(),
            "Failed to start supervised process"
        );
        // The supervisor already logged the failure to the sink
        if !self.supervisor.sink().is_available() {
            report_fatal(&format!("failed to start supervised process: {e}"));
        }
    }
}
