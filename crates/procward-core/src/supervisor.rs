use crate::config::SupervisorConfig;
use crate::error::SupervisorError;
use crate::monitor::HealthMonitor;
use crate::output::forward_output;
use crate::path::{PathResolver, ResolvedPath};
use crate::process::{LaunchCommand, ProcessHandle, ProcessId, ProcessManager};
use crate::shutdown::ShutdownCoordinator;
use crate::sink::{LogRecord, LogSink, LogSource};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of one supervised child. Transitions only move forward:
/// `NotStarted → Starting → Running → Stopping → Stopped`, with `Failed`
/// reachable from `Starting` and `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Stopped | ProcessState::Failed)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

type HandleSlot = tokio::sync::Mutex<Option<Box<dyn ProcessHandle>>>;

struct Shared {
    /// Single-writer gate between `Stop` and the monitor's unexpected-exit path
    state: watch::Sender<ProcessState>,
    handle: HandleSlot,
    pid: Mutex<Option<ProcessId>>,
    exit_code: Mutex<Option<i32>>,
    monitor: Mutex<Option<CancellationToken>>,
}

/// The one child process instance managed for a configuration.
///
/// Cloning yields another view of the same instance.
#[derive(Clone)]
pub struct SupervisedProcess {
    config_path: PathBuf,
    resolved: ResolvedPath,
    binary_path: PathBuf,
    working_dir: PathBuf,
    shared: Arc<Shared>,
}

impl SupervisedProcess {
    fn new(
        config_path: PathBuf,
        resolved: ResolvedPath,
        binary_path: PathBuf,
        working_dir: PathBuf,
    ) -> Self {
        let (state, _) = watch::channel(ProcessState::NotStarted);
        Self {
            config_path,
            resolved,
            binary_path,
            working_dir,
            shared: Arc::new(Shared {
                state,
                handle: tokio::sync::Mutex::new(None),
                pid: Mutex::new(None),
                exit_code: Mutex::new(None),
                monitor: Mutex::new(None),
            }),
        }
    }

    /// Config path as supplied by the caller
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn resolved_config_path(&self) -> &Path {
        &self.resolved.absolute
    }

    pub fn translated_config_path(&self) -> &str {
        &self.resolved.translated
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_dir
    }

    pub fn state(&self) -> ProcessState {
        *self.shared.state.borrow()
    }

    pub fn pid(&self) -> Option<ProcessId> {
        *lock(&self.shared.pid)
    }

    pub fn exit_code(&self) -> Option<i32> {
        *lock(&self.shared.exit_code)
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<ProcessState> {
        self.shared.state.subscribe()
    }

    /// Whether a process handle is currently owned
    pub async fn has_handle(&self) -> bool {
        self.shared.handle.lock().await.is_some()
    }

    /// Wait until the process reached `Stopped` or `Failed`
    pub async fn wait_terminal(&self) -> ProcessState {
        let mut rx = self.subscribe();
        match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Compare-and-set: move to `to` only from one of `from`
    pub(crate) fn transition(&self, from: &[ProcessState], to: ProcessState) -> bool {
        self.shared.state.send_if_modified(|state| {
            if from.contains(state) {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn force_state(&self, to: ProcessState) {
        self.shared.state.send_replace(to);
    }

    pub(crate) fn handle_slot(&self) -> &HandleSlot {
        &self.shared.handle
    }

    pub(crate) fn set_pid(&self, pid: Option<ProcessId>) {
        *lock(&self.shared.pid) = pid;
    }

    pub(crate) fn set_exit_code(&self, code: i32) {
        *lock(&self.shared.exit_code) = Some(code);
    }

    pub(crate) fn set_monitor(&self, token: CancellationToken) {
        *lock(&self.shared.monitor) = Some(token);
    }

    pub(crate) fn cancel_monitor(&self) {
        if let Some(token) = lock(&self.shared.monitor).take() {
            token.cancel();
        }
    }

    pub(crate) fn describe_pid(&self) -> String {
        self.pid()
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

impl fmt::Debug for SupervisedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisedProcess")
            .field("config_path", &self.config_path)
            .field("resolved", &self.resolved)
            .field("binary_path", &self.binary_path)
            .field("state", &self.state())
            .field("pid", &self.pid())
            .field("exit_code", &self.exit_code())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Launches the supervised binary and owns the start half of its lifecycle
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    resolver: PathResolver,
    manager: Arc<dyn ProcessManager>,
    sink: Arc<dyn LogSink>,
    shutdown: ShutdownCoordinator,
}

impl ProcessSupervisor {
    pub fn new(
        config: SupervisorConfig,
        manager: Arc<dyn ProcessManager>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        info!(
            platform = manager.platform_name(),
            base_directory = %config.base_directory.display(),
            "Created process supervisor"
        );
        Self {
            resolver: PathResolver::new(config.mount_root.clone()),
            shutdown: ShutdownCoordinator::new(manager.clone(), sink.clone())
                .with_kill_timeout(config.kill_timeout()),
            config,
            manager,
            sink,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn sink(&self) -> Arc<dyn LogSink> {
        self.sink.clone()
    }

    /// Resolve `config_path` and create the (not yet started) instance for it
    pub fn supervise(&self, config_path: impl AsRef<Path>) -> Result<SupervisedProcess, SupervisorError> {
        let config_path = config_path.as_ref();
        let resolved = self
            .resolver
            .resolve(config_path, &self.config.base_directory)
            .inspect_err(|e| {
                self.sink.emit(LogRecord::error(format!(
                    "cannot resolve config path {}: {e}",
                    config_path.display()
                )));
            })?;

        debug!(
            absolute = %resolved.absolute.display(),
            translated = %resolved.translated,
            "Resolved config path"
        );

        Ok(SupervisedProcess::new(
            config_path.to_path_buf(),
            resolved,
            self.config.binary_path(),
            self.config.base_directory.clone(),
        ))
    }

    /// Resolve `config_path` and launch the binary for it
    pub async fn start(&self, config_path: impl AsRef<Path>) -> Result<SupervisedProcess, SupervisorError> {
        let process = self.supervise(config_path)?;
        self.launch(&process).await?;
        Ok(process)
    }

    /// Launch a prepared instance. Each instance launches at most once.
    pub async fn launch(&self, process: &SupervisedProcess) -> Result<(), SupervisorError> {
        let state = process.state();
        if state != ProcessState::NotStarted {
            self.sink.emit(LogRecord::warning(format!(
                "start rejected for {}: process is {state}",
                process.binary_path().display()
            )));
            return Err(SupervisorError::AlreadyStarted(state));
        }

        let binary = process.binary_path();
        if !tokio::fs::try_exists(binary).await.unwrap_or(false) {
            self.sink.emit(LogRecord::error(format!(
                "binary not found: {}",
                binary.display()
            )));
            return Err(SupervisorError::BinaryNotFound(binary.to_path_buf()));
        }

        if !process.transition(&[ProcessState::NotStarted], ProcessState::Starting) {
            return Err(SupervisorError::AlreadyStarted(process.state()));
        }

        let config_file = process.resolved_config_path();
        if !tokio::fs::try_exists(config_file).await.unwrap_or(false) {
            self.sink.emit(LogRecord::warning(format!(
                "config file {} not found; {} will run with its built-in defaults",
                config_file.display(),
                binary.display()
            )));
        }

        let command = LaunchCommand::new(binary, process.working_directory())
            .arg(process.translated_config_path());

        let mut handle = match self.manager.spawn_process(&command).await {
            Ok(handle) => handle,
            Err(e) => {
                process.force_state(ProcessState::Failed);
                warn!(binary = %binary.display(), error = %e, "Spawn failed");
                self.sink.emit(LogRecord::error(format!(
                    "failed to spawn {}: {e}",
                    binary.display()
                )));
                return Err(SupervisorError::SpawnFailed {
                    binary: binary.to_path_buf(),
                    source: e,
                });
            }
        };

        if let Some(stdout) = handle.take_stdout() {
            forward_output(stdout, LogSource::ChildStdout, self.sink.clone());
        }
        if let Some(stderr) = handle.take_stderr() {
            forward_output(stderr, LogSource::ChildStderr, self.sink.clone());
        }

        let pid = handle.get_pid();
        {
            let mut slot = process.handle_slot().lock().await;
            *slot = Some(handle);
            process.set_pid(pid);
            process.transition(&[ProcessState::Starting], ProcessState::Running);
        }

        let args = command
            .args
            .iter()
            .map(|arg| format!("\"{arg}\""))
            .collect::<Vec<_>>()
            .join(" ");
        self.sink.emit(LogRecord::info(format!(
            "started {} with args [{args}] (pid {})",
            binary.display(),
            process.describe_pid()
        )));

        let token = CancellationToken::new();
        process.set_monitor(token.clone());
        HealthMonitor::new(self.config.poll_interval(), self.sink.clone())
            .spawn(process.clone(), token);

        Ok(())
    }

    /// Stop with the configured grace period
    pub async fn stop(&self, process: &SupervisedProcess) {
        self.shutdown.stop(process, self.config.grace_period()).await
    }

    pub async fn stop_with_grace(&self, process: &SupervisedProcess, grace_period: Duration) {
        self.shutdown.stop(process, grace_period).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_classification() {
        assert!(ProcessState::Stopped.is_terminal());
        assert!(ProcessState::Failed.is_terminal());
        assert!(!ProcessState::Stopping.is_terminal());
        assert!(!ProcessState::NotStarted.is_terminal());
    }

    fn instance() -> SupervisedProcess {
        let resolved = PathResolver::new("/mnt")
            .resolve(r"C:\svc\redis.conf", "/ignored")
            .unwrap();
        SupervisedProcess::new(
            PathBuf::from(r"C:\svc\redis.conf"),
            resolved,
            PathBuf::from("/opt/kv/redis-server"),
            PathBuf::from("/opt/kv"),
        )
    }

    #[test]
    fn test_transition_is_compare_and_set() {
        let process = instance();
        assert_eq!(process.state(), ProcessState::NotStarted);

        assert!(process.transition(&[ProcessState::NotStarted], ProcessState::Starting));
        assert!(!process.transition(&[ProcessState::NotStarted], ProcessState::Starting));
        assert!(process.transition(&[ProcessState::Starting], ProcessState::Running));

        // whichever side leaves Running first wins
        assert!(process.transition(&[ProcessState::Running], ProcessState::Stopping));
        assert!(!process.transition(&[ProcessState::Running], ProcessState::Failed));
        assert_eq!(process.state(), ProcessState::Stopping);
    }

    #[tokio::test]
    async fn test_new_instance_has_no_handle() {
        let process = instance();
        assert!(!process.has_handle().await);
        assert_eq!(process.pid(), None);
        assert_eq!(process.exit_code(), None);
        assert_eq!(process.translated_config_path(), "/mnt/c/svc/redis.conf");
    }

    #[tokio::test]
    async fn test_wait_terminal_observes_transition() {
        let process = instance();
        let waiter = tokio::spawn({
            let process = process.clone();
            async move { process.wait_terminal().await }
        });
        process.force_state(ProcessState::Failed);
        assert_eq!(waiter.await.unwrap(), ProcessState::Failed);
    }
}
