use crate::path::PathError;
use crate::process::ProcessError;
use crate::supervisor::ProcessState;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by supervisor operations
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("binary not found: {}", .0.display())]
    BinaryNotFound(PathBuf),

    #[error("unresolvable config path: {0}")]
    Path(#[from] PathError),

    #[error("supervised process already started (state: {0})")]
    AlreadyStarted(ProcessState),

    #[error("failed to spawn {}: {source}", binary.display())]
    SpawnFailed {
        binary: PathBuf,
        #[source]
        source: ProcessError,
    },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl SupervisorError {
    /// Missing binary, unresolvable path or invalid settings
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SupervisorError::BinaryNotFound(_)
                | SupervisorError::Path(_)
                | SupervisorError::ConfigurationError(_)
        )
    }

    /// Check if this error indicates a permanent failure of the start attempt.
    /// The supervisor never retries; this only tells the host whether a retry
    /// on its side could succeed without operator action.
    pub fn is_permanent(&self) -> bool {
        self.is_configuration_error() || matches!(self, SupervisorError::AlreadyStarted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categorization() {
        assert!(SupervisorError::BinaryNotFound(PathBuf::from("/x")).is_configuration_error());
        assert!(SupervisorError::Path(PathError::Empty).is_configuration_error());
        assert!(SupervisorError::ConfigurationError("bad".into()).is_permanent());
        assert!(SupervisorError::AlreadyStarted(ProcessState::Running).is_permanent());

        let spawn = SupervisorError::SpawnFailed {
            binary: PathBuf::from("/opt/kv/redis-server"),
            source: ProcessError::SpawnFailed("resource exhausted".into()),
        };
        assert!(!spawn.is_configuration_error());
        assert!(!spawn.is_permanent());
    }

    #[test]
    fn test_error_display() {
        let error = SupervisorError::BinaryNotFound(PathBuf::from("/opt/kv/redis-server"));
        assert_eq!(format!("{error}"), "binary not found: /opt/kv/redis-server");

        let error = SupervisorError::AlreadyStarted(ProcessState::Stopping);
        assert!(format!("{error}").contains("Stopping"));

        let error = SupervisorError::SpawnFailed {
            binary: PathBuf::from("/opt/kv/redis-server"),
            source: ProcessError::PermissionDenied("EACCES".into()),
        };
        let display = format!("{error}");
        assert!(display.contains("/opt/kv/redis-server"));
        assert!(display.contains("Permission denied"));
    }
}
