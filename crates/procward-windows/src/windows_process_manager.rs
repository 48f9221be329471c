use anyhow::Result;
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use procward_core::*;

/// CREATE_NO_WINDOW: no console window for background children
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

fn to_status(status: ExitStatus) -> ProcessStatus {
    match status.code() {
        Some(code) => ProcessStatus::Exited(code),
        None => ProcessStatus::Signaled(None),
    }
}

fn hide_window(cmd: &mut Command) {
    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);
    #[cfg(not(windows))]
    let _ = cmd;
}

/// Windows-specific process handle implementation
pub struct WindowsProcessHandle {
    child: Child,
    command: String,
}

impl WindowsProcessHandle {
    pub fn new(child: Child, command: String) -> Self {
        Self { child, command }
    }
}

#[async_trait]
impl ProcessHandle for WindowsProcessHandle {
    fn get_pid(&self) -> Option<ProcessId> {
        self.child.id()
    }

    fn get_command(&self) -> &str {
        &self.command
    }

    fn take_stdout(&mut self) -> Option<ChildStream> {
        self.child
            .stdout
            .take()
            .map(|stdout| Box::new(stdout) as ChildStream)
    }

    fn take_stderr(&mut self) -> Option<ChildStream> {
        self.child
            .stderr
            .take()
            .map(|stderr| Box::new(stderr) as ChildStream)
    }

    async fn try_wait(&mut self) -> Result<Option<ProcessStatus>> {
        Ok(self.child.try_wait()?.map(to_status))
    }

    async fn wait(&mut self) -> Result<ProcessStatus> {
        let status = self.child.wait().await?;
        Ok(to_status(status))
    }

    async fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to kill process: {}", e))
    }
}

/// Windows-specific process manager built on `taskkill`
#[derive(Debug, Default)]
pub struct WindowsProcessManager;

impl WindowsProcessManager {
    pub fn new() -> Self {
        info!("Initializing Windows process manager");
        Self
    }

    /// Run taskkill against `pid`; `force` adds `/F /T` so the whole tree goes
    async fn taskkill(&self, pid: u32, force: bool) -> Result<bool> {
        let pid_string = pid.to_string();
        let mut args = Vec::new();
        if force {
            args.extend(["/F", "/T"]);
        }
        args.extend(["/PID", &pid_string]);

        let mut cmd = Command::new("taskkill");
        cmd.args(&args).stdin(Stdio::null());
        hide_window(&mut cmd);
        let output = cmd.output().await?;

        debug!(
            pid = %pid,
            force,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "taskkill finished"
        );
        Ok(output.status.success())
    }
}

#[async_trait]
impl ProcessLifecycle for WindowsProcessManager {
    async fn spawn_process(
        &self,
        command: &LaunchCommand,
    ) -> Result<Box<dyn ProcessHandle>, ProcessError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        hide_window(&mut cmd);

        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                ProcessError::PermissionDenied(format!("{}: {e}", command.program.display()))
            }
            _ => ProcessError::SpawnFailed(format!("{}: {e}", command.program.display())),
        })?;

        if let Some(pid) = child.id() {
            info!(
                pid = %pid,
                command = %command.program.display(),
                args = ?command.args,
                "Spawned Windows process"
            );
        }

        Ok(Box::new(WindowsProcessHandle::new(
            child,
            command.program.display().to_string(),
        )))
    }
}

#[async_trait]
impl ProcessTermination for WindowsProcessManager {
    async fn terminate_gracefully(&self, handle: &mut dyn ProcessHandle) -> TerminationResult {
        if let Ok(Some(_)) = handle.try_wait().await {
            return TerminationResult::ProcessNotFound;
        }
        let Some(pid) = handle.get_pid() else {
            return TerminationResult::ProcessNotFound;
        };

        match self.taskkill(pid, false).await {
            Ok(true) => {
                info!(pid=%pid, "Successfully sent graceful termination to process");
                TerminationResult::Success
            }
            Ok(false) => {
                // Console-less children refuse a plain close request
                warn!(pid=%pid, "Process rejected graceful termination");
                TerminationResult::Failed("taskkill without /F was refused".to_string())
            }
            Err(e) => {
                warn!(pid=%pid, error=%e, "Failed to gracefully terminate process");
                TerminationResult::Failed(format!("Graceful termination failed: {e}"))
            }
        }
    }

    async fn force_kill(&self, handle: &mut dyn ProcessHandle) -> TerminationResult {
        if let Ok(Some(_)) = handle.try_wait().await {
            return TerminationResult::ProcessNotFound;
        }
        let Some(pid) = handle.get_pid() else {
            return TerminationResult::ProcessNotFound;
        };

        match self.taskkill(pid, true).await {
            Ok(true) => info!(pid=%pid, "Successfully force killed process tree"),
            Ok(false) => warn!(pid=%pid, "taskkill /F failed, falling back to TerminateProcess"),
            Err(e) => warn!(pid=%pid, error=%e, "taskkill unavailable, falling back to TerminateProcess"),
        }

        match handle.kill().await {
            Ok(()) => TerminationResult::Success,
            Err(e) => match handle.try_wait().await {
                Ok(Some(_)) => TerminationResult::Success,
                _ => {
                    warn!(pid=%pid, error=%e, "Failed to force kill process");
                    TerminationResult::Failed(format!("Force kill failed: {e}"))
                }
            },
        }
    }
}

impl ProcessManager for WindowsProcessManager {
    fn platform_name(&self) -> &'static str {
        "Windows"
    }
}
