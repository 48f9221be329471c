//! Shared test doubles and fixtures for the supervisor suites

use anyhow::Result;
use async_trait::async_trait;
use procward_core::{
    ChildStream, LaunchCommand, MemorySink, ProcessError, ProcessHandle, ProcessId,
    ProcessLifecycle, ProcessManager, ProcessStatus, ProcessSupervisor, ProcessTermination,
    SupervisorConfig, TerminationResult,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

type StatusCell = Arc<watch::Sender<Option<ProcessStatus>>>;

/// How the fake child and platform react
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeBehavior {
    pub fail_spawn: bool,
    /// Termination request is accepted but the child keeps running
    pub ignore_terminate: bool,
    /// Termination request itself errors
    pub fail_terminate: bool,
    pub fail_kill: bool,
    /// Termination request never returns
    pub hang_terminate: bool,
    /// Forced kill never returns
    pub hang_kill: bool,
}

pub struct FakeHandle {
    pid: ProcessId,
    command: String,
    status: StatusCell,
    stdout: Option<ChildStream>,
    stderr: Option<ChildStream>,
}

#[async_trait]
impl ProcessHandle for FakeHandle {
    fn get_pid(&self) -> Option<ProcessId> {
        Some(self.pid)
    }

    fn get_command(&self) -> &str {
        &self.command
    }

    fn take_stdout(&mut self) -> Option<ChildStream> {
        self.stdout.take()
    }

    fn take_stderr(&mut self) -> Option<ChildStream> {
        self.stderr.take()
    }

    async fn try_wait(&mut self) -> Result<Option<ProcessStatus>> {
        Ok(*self.status.borrow())
    }

    async fn wait(&mut self) -> Result<ProcessStatus> {
        let mut rx = self.status.subscribe();
        let status = *rx.wait_for(|s| s.is_some()).await?;
        Ok(status.unwrap_or(ProcessStatus::Signaled(None)))
    }

    async fn kill(&mut self) -> Result<()> {
        self.status.send_replace(Some(ProcessStatus::Signaled(Some(9))));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeProcessManager {
    behavior: FakeBehavior,
    next_pid: AtomicU32,
    children: Mutex<HashMap<ProcessId, StatusCell>>,
    spawned: Mutex<Vec<LaunchCommand>>,
    output: Mutex<Option<(Vec<u8>, Vec<u8>)>>,
    graceful_requests: AtomicUsize,
    force_kills: AtomicUsize,
}

impl FakeProcessManager {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            next_pid: AtomicU32::new(4242),
            ..Default::default()
        }
    }

    /// Output the next spawned child writes before going quiet
    pub fn with_output(self, stdout: &[u8], stderr: &[u8]) -> Self {
        *self.output.lock().unwrap() = Some((stdout.to_vec(), stderr.to_vec()));
        self
    }

    pub fn spawned(&self) -> Vec<LaunchCommand> {
        self.spawned.lock().unwrap().clone()
    }

    pub fn graceful_requests(&self) -> usize {
        self.graceful_requests.load(Ordering::SeqCst)
    }

    pub fn force_kills(&self) -> usize {
        self.force_kills.load(Ordering::SeqCst)
    }

    /// Make the child exit on its own
    pub fn exit(&self, pid: ProcessId, status: ProcessStatus) {
        if let Some(cell) = self.children.lock().unwrap().get(&pid) {
            cell.send_replace(Some(status));
        }
    }

    fn cell(&self, handle: &dyn ProcessHandle) -> Option<StatusCell> {
        let pid = handle.get_pid()?;
        self.children.lock().unwrap().get(&pid).cloned()
    }
}

#[async_trait]
impl ProcessLifecycle for FakeProcessManager {
    async fn spawn_process(
        &self,
        command: &LaunchCommand,
    ) -> Result<Box<dyn ProcessHandle>, ProcessError> {
        if self.behavior.fail_spawn {
            return Err(ProcessError::SpawnFailed(
                "simulated resource exhaustion".to_string(),
            ));
        }

        self.spawned.lock().unwrap().push(command.clone());
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let (tx, _) = watch::channel(None);
        let status = Arc::new(tx);
        self.children.lock().unwrap().insert(pid, status.clone());

        let (stdout, stderr) = match self.output.lock().unwrap().take() {
            Some((out, err)) => (
                Some(Box::new(std::io::Cursor::new(out)) as ChildStream),
                Some(Box::new(std::io::Cursor::new(err)) as ChildStream),
            ),
            None => (None, None),
        };

        Ok(Box::new(FakeHandle {
            pid,
            command: command.program.display().to_string(),
            status,
            stdout,
            stderr,
        }))
    }
}

#[async_trait]
impl ProcessTermination for FakeProcessManager {
    async fn terminate_gracefully(&self, handle: &mut dyn ProcessHandle) -> TerminationResult {
        self.graceful_requests.fetch_add(1, Ordering::SeqCst);
        if self.behavior.hang_terminate {
            std::future::pending::<()>().await;
        }
        if self.behavior.fail_terminate {
            return TerminationResult::Failed("simulated termination error".to_string());
        }
        let Some(cell) = self.cell(handle) else {
            return TerminationResult::ProcessNotFound;
        };
        if cell.borrow().is_some() {
            return TerminationResult::ProcessNotFound;
        }
        if !self.behavior.ignore_terminate {
            cell.send_replace(Some(ProcessStatus::Signaled(Some(15))));
        }
        TerminationResult::Success
    }

    async fn force_kill(&self, handle: &mut dyn ProcessHandle) -> TerminationResult {
        self.force_kills.fetch_add(1, Ordering::SeqCst);
        if self.behavior.hang_kill {
            std::future::pending::<()>().await;
        }
        let Some(cell) = self.cell(handle) else {
            return TerminationResult::ProcessNotFound;
        };
        if cell.borrow().is_some() {
            return TerminationResult::ProcessNotFound;
        }
        if self.behavior.fail_kill {
            return TerminationResult::AccessDenied;
        }
        cell.send_replace(Some(ProcessStatus::Signaled(Some(9))));
        TerminationResult::Success
    }
}

impl ProcessManager for FakeProcessManager {
    fn platform_name(&self) -> &'static str {
        "fake"
    }
}

/// Supervisor over a scratch installation directory
pub struct Fixture {
    pub dir: TempDir,
    pub config: SupervisorConfig,
    pub manager: Arc<FakeProcessManager>,
    pub sink: Arc<MemorySink>,
    pub supervisor: ProcessSupervisor,
}

pub const POLL: Duration = Duration::from_millis(50);

impl Fixture {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self::with_manager(FakeProcessManager::new(behavior))
    }

    pub fn with_manager(manager: FakeProcessManager) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SupervisorConfig::with_base_directory(dir.path());
        config.poll_interval_ms = POLL.as_millis() as u64;
        config.kill_timeout_ms = 200;

        std::fs::write(config.binary_path(), b"not really an executable").unwrap();
        std::fs::write(config.default_config_path(), b"port 6379\n").unwrap();

        let manager = Arc::new(manager);
        let sink = Arc::new(MemorySink::new());
        let supervisor = ProcessSupervisor::new(config.clone(), manager.clone(), sink.clone());

        Self {
            dir,
            config,
            manager,
            sink,
            supervisor,
        }
    }

    pub fn remove_binary(&self) {
        std::fs::remove_file(self.config.binary_path()).unwrap();
    }

    pub fn remove_config(&self) {
        std::fs::remove_file(self.config.default_config_path()).unwrap();
    }
}

/// Poll `check` until it holds or `within` elapses
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
