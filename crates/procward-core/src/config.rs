use crate::error::SupervisorError;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound accepted for the shutdown grace period (10 minutes)
const MAX_GRACE_PERIOD_MS: u64 = 600_000;

/// Supervisor configuration.
///
/// Every default the supervisor relies on lives here and is handed to the
/// supervisor at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(setter(into))]
pub struct SupervisorConfig {
    /// Installation directory of the supervisor. Used as the child's working
    /// directory and as the base for relative config paths and the binary.
    pub base_directory: PathBuf,

    /// File name of the supervised executable, relative to `base_directory`
    /// unless absolute
    #[serde(default = "default_binary_name")]
    #[builder(default = "default_binary_name()")]
    pub binary_name: String,

    /// Config file used when the caller does not name one
    #[serde(default = "default_config_file")]
    #[builder(default = "default_config_file()")]
    pub default_config_file: String,

    /// Mount prefix replacing the drive letter in translated paths
    #[serde(default = "default_mount_root")]
    #[builder(default = "default_mount_root()")]
    pub mount_root: String,

    /// Liveness poll period (in milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    #[builder(default = "default_poll_interval_ms()")]
    pub poll_interval_ms: u64,

    /// Time the child is given to exit after the termination request (in milliseconds)
    #[serde(default = "default_grace_period_ms")]
    #[builder(default = "default_grace_period_ms()")]
    pub grace_period_ms: u64,

    /// Time allowed for reaping the child after a forced kill (in milliseconds)
    #[serde(default = "default_kill_timeout_ms")]
    #[builder(default = "default_kill_timeout_ms()")]
    pub kill_timeout_ms: u64,
}

impl SupervisorConfig {
    pub fn builder() -> SupervisorConfigBuilder {
        SupervisorConfigBuilder::default()
    }

    /// Config with every default applied for the given installation directory
    pub fn with_base_directory(base_directory: impl Into<PathBuf>) -> Self {
        Self {
            base_directory: base_directory.into(),
            binary_name: default_binary_name(),
            default_config_file: default_config_file(),
            mount_root: default_mount_root(),
            poll_interval_ms: default_poll_interval_ms(),
            grace_period_ms: default_grace_period_ms(),
            kill_timeout_ms: default_kill_timeout_ms(),
        }
    }

    /// Load a configuration from a JSON document on disk
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SupervisorError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SupervisorError::ConfigurationError(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            SupervisorError::ConfigurationError(format!("failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return errors if invalid
    pub fn validate(&self) -> Result<(), SupervisorError> {
        let invalid = |msg: String| -> Result<(), SupervisorError> {
            Err(SupervisorError::ConfigurationError(msg))
        };

        if self.binary_name.trim().is_empty() {
            return invalid("binary_name cannot be empty".to_string());
        }

        if self.poll_interval_ms == 0 {
            return invalid("poll_interval_ms must be greater than zero".to_string());
        }

        if self.grace_period_ms > MAX_GRACE_PERIOD_MS {
            return invalid(format!(
                "grace_period_ms should not exceed {MAX_GRACE_PERIOD_MS}"
            ));
        }

        if !self.mount_root.starts_with('/') || self.mount_root.contains('\\') {
            return invalid(format!(
                "mount_root must be an absolute POSIX path, got {:?}",
                self.mount_root
            ));
        }

        if self.mount_root.len() > 1 && self.mount_root.ends_with('/') {
            return invalid("mount_root must not end with '/'".to_string());
        }

        Ok(())
    }

    /// Absolute path of the supervised executable
    pub fn binary_path(&self) -> PathBuf {
        self.base_directory.join(&self.binary_name)
    }

    /// Config path used when none is supplied
    pub fn default_config_path(&self) -> PathBuf {
        self.base_directory.join(&self.default_config_file)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }
}

// Default value functions for serde and the builder
fn default_binary_name() -> String {
    format!("redis-server{}", std::env::consts::EXE_SUFFIX)
}
fn default_config_file() -> String {
    "redis.conf".to_string()
}
fn default_mount_root() -> String {
    "/mnt".to_string()
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_grace_period_ms() -> u64 {
    5_000
}
fn default_kill_timeout_ms() -> u64 {
    2_000
}
