#[cfg(unix)]
mod unix_impl {
    use anyhow::Result;
    use async_trait::async_trait;
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    use procward_core::{
        ChildStream, LaunchCommand, ProcessError, ProcessHandle, ProcessId, ProcessLifecycle,
        ProcessManager, ProcessStatus, ProcessTermination, TerminationResult,
    };
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Stdio};
    use tokio::process::{Child, Command};
    use tracing::{debug, info, warn};

    fn to_status(status: ExitStatus) -> ProcessStatus {
        match status.code() {
            Some(code) => ProcessStatus::Exited(code),
            None => ProcessStatus::Signaled(status.signal()),
        }
    }

    /// Unix-specific process handle implementation
    pub struct UnixProcessHandle {
        child: Child,
        command: String,
    }

    impl UnixProcessHandle {
        pub fn new(child: Child, command: String) -> Self {
            Self { child, command }
        }
    }

    #[async_trait]
    impl ProcessHandle for UnixProcessHandle {
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

    /// Unix process manager. Each child leads its own process group so a
    /// forced kill also reaches anything it forked.
    #[derive(Debug, Default)]
    pub struct UnixProcessManager;

    impl UnixProcessManager {
        pub fn new() -> Self {
            info!("Initializing Unix process manager");
            Self
        }

        fn spawn_error(command: &LaunchCommand, e: std::io::Error) -> ProcessError {
            let program = command.program.display();
            match e.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    ProcessError::PermissionDenied(format!("{program}: {e}"))
                }
                _ => ProcessError::SpawnFailed(format!("{program}: {e}")),
            }
        }
    }

    #[async_trait]
    impl ProcessLifecycle for UnixProcessManager {
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
                .kill_on_drop(true)
                .process_group(0);

            let child = cmd
                .spawn()
                .map_err(|e| Self::spawn_error(command, e))?;

            if let Some(pid) = child.id() {
                info!(
                    "Spawned Unix process: {} (PID: {}) with args: {:?}",
                    command.program.display(),
                    pid,
                    command.args
                );
            }

            Ok(Box::new(UnixProcessHandle::new(
                child,
                command.program.display().to_string(),
            )))
        }
    }

    #[async_trait]
    impl ProcessTermination for UnixProcessManager {
        async fn terminate_gracefully(&self, handle: &mut dyn ProcessHandle) -> TerminationResult {
            if let Ok(Some(status)) = handle.try_wait().await {
                debug!("Process already exited ({}), skipping SIGTERM", status);
                return TerminationResult::ProcessNotFound;
            }
            let Some(pid) = handle.get_pid() else {
                return TerminationResult::ProcessNotFound;
            };
            let nix_pid = NixPid::from_raw(pid as i32);

            match signal::kill(nix_pid, Signal::SIGTERM) {
                Ok(()) => {
                    info!("Sent SIGTERM to process {}", pid);
                    TerminationResult::Success
                }
                Err(Errno::ESRCH) => {
                    info!("Process {} not found (already terminated)", pid);
                    TerminationResult::ProcessNotFound
                }
                Err(Errno::EPERM) => {
                    warn!("Permission denied to terminate process {}", pid);
                    TerminationResult::AccessDenied
                }
                Err(e) => {
                    warn!("Failed to send SIGTERM to process {}: {}", pid, e);
                    TerminationResult::Failed(format!("SIGTERM failed: {e}"))
                }
            }
        }

        async fn force_kill(&self, handle: &mut dyn ProcessHandle) -> TerminationResult {
            if let Ok(Some(status)) = handle.try_wait().await {
                debug!("Process already exited ({}), skipping SIGKILL", status);
                return TerminationResult::ProcessNotFound;
            }
            let Some(pid) = handle.get_pid() else {
                return TerminationResult::ProcessNotFound;
            };
            let pgid = NixPid::from_raw(pid as i32);

            match signal::killpg(pgid, Signal::SIGKILL) {
                Ok(()) => info!("Sent SIGKILL to process group {}", pid),
                Err(Errno::ESRCH) => debug!("Process group {} already gone", pid),
                Err(Errno::EPERM) => {
                    warn!("Permission denied to kill process group {}", pid);
                    return TerminationResult::AccessDenied;
                }
                Err(e) => {
                    warn!("Failed to send SIGKILL to process group {}: {}", pid, e);
                    return TerminationResult::Failed(format!("SIGKILL failed: {e}"));
                }
            }

            // Reaps the leader even if the group signal missed it
            if let Err(e) = handle.kill().await {
                warn!("Handle kill cleanup failed: {}", e);
            }
            TerminationResult::Success
        }
    }

    impl ProcessManager for UnixProcessManager {
        fn platform_name(&self) -> &'static str {
            "Unix"
        }
    }
}

#[cfg(unix)]
pub use unix_impl::{UnixProcessHandle, UnixProcessManager};

// Provide stub implementations for non-Unix systems
#[cfg(not(unix))]
pub struct UnixProcessHandle;

#[cfg(not(unix))]
#[derive(Debug, Default)]
pub struct UnixProcessManager;

#[cfg(not(unix))]
impl UnixProcessManager {
    pub fn new() -> Self {
        Self
    }
}
