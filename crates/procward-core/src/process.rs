use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use tokio::io::AsyncRead;

/// Unique identifier for a process
pub type ProcessId = u32;

/// Readable end of a captured child stream
pub type ChildStream = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Status of a child process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Process is currently running
    Running,
    /// Process exited on its own with the given exit code
    Exited(i32),
    /// Process was terminated by a signal (Unix) or without an exit code
    Signaled(Option<i32>),
}

impl ProcessStatus {
    /// Exit code, when the process reported one
    pub fn code(&self) -> Option<i32> {
        match self {
            ProcessStatus::Exited(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Running => write!(f, "running"),
            ProcessStatus::Exited(code) => write!(f, "exit code {code}"),
            ProcessStatus::Signaled(Some(signal)) => write!(f, "terminated by signal {signal}"),
            ProcessStatus::Signaled(None) => write!(f, "terminated without exit code"),
        }
    }
}

/// Result of a process termination operation
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationResult {
    /// Termination request was delivered
    Success,
    /// Process was not found (already exited)
    ProcessNotFound,
    /// Permission denied (insufficient privileges)
    AccessDenied,
    /// Operation failed with specific error message
    Failed(String),
}

impl TerminationResult {
    /// The request reached the process or the process was already gone
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            TerminationResult::Success | TerminationResult::ProcessNotFound
        )
    }
}

/// Error types for process operations
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to spawn process: {0}")]
    SpawnFailed(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

/// Everything needed to launch the supervised binary
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    /// Each entry is handed to the OS as one argv element
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl LaunchCommand {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Trait representing a handle to a running process
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Get the process ID (None if process has exited)
    fn get_pid(&self) -> Option<ProcessId>;

    /// Get the command that started this process
    fn get_command(&self) -> &str;

    /// Take ownership of the captured standard output, once
    fn take_stdout(&mut self) -> Option<ChildStream>;

    /// Take ownership of the captured standard error, once
    fn take_stderr(&mut self) -> Option<ChildStream>;

    /// Try to get exit status without blocking
    async fn try_wait(&mut self) -> Result<Option<ProcessStatus>>;

    /// Wait for the process to exit
    async fn wait(&mut self) -> Result<ProcessStatus>;

    /// Kill the process (platform-specific implementation)
    async fn kill(&mut self) -> Result<()>;
}

/// Core trait for process lifecycle management
#[async_trait]
pub trait ProcessLifecycle: Send + Sync {
    /// Spawn the process with captured stdout/stderr
    async fn spawn_process(
        &self,
        command: &LaunchCommand,
    ) -> Result<Box<dyn ProcessHandle>, ProcessError>;
}

/// Trait for escalating process termination
#[async_trait]
pub trait ProcessTermination: Send + Sync {
    /// Ask the process to exit (SIGTERM on Unix)
    async fn terminate_gracefully(&self, handle: &mut dyn ProcessHandle) -> TerminationResult;

    /// Force kill the process. Killing a process that already exited
    /// yields `ProcessNotFound`, never an error.
    async fn force_kill(&self, handle: &mut dyn ProcessHandle) -> TerminationResult;
}

/// High-level process manager trait that combines lifecycle and termination
pub trait ProcessManager: ProcessLifecycle + ProcessTermination {
    /// Platform name for logging and debugging
    fn platform_name(&self) -> &'static str;
}

/// Factory trait for creating platform-specific process managers
pub trait ProcessManagerFactory {
    /// The type of process manager this factory creates
    type Manager: ProcessManager + 'static;

    /// Create a process manager for the current platform
    fn create_process_manager() -> Self::Manager;

    /// Get the platform name for logging and debugging
    fn platform_name() -> &'static str;
}
