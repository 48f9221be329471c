//! Command line surface of the `procward` binary

use clap::{Parser, ValueEnum};
use procward_core::{SupervisorConfig, SupervisorError};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Plain,
    Json,
}

/// Runs a server binary as a supervised child process
#[derive(Debug, Parser)]
#[command(name = "procward")]
#[command(about = "Launches, monitors and cleanly stops a server binary")]
pub struct Args {
    /// Configuration file handed to the supervised binary
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Installation directory (defaults to the directory of this executable)
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Name or path of the supervised executable
    #[arg(long)]
    pub binary: Option<String>,

    /// Mount prefix used when translating drive-letter paths
    #[arg(long)]
    pub mount_root: Option<String>,

    /// Seconds the child gets to exit before it is killed
    #[arg(long)]
    pub grace_period: Option<u64>,

    /// JSON settings file; command line flags take precedence
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Also append supervisor records to this file as JSON lines
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Args {
    /// Build the supervisor configuration.
    ///
    /// Starts from the `--settings` file when given, otherwise from the
    /// defaults for `--base-dir` or the executable's directory. Individual
    /// flags are applied last and the result is validated.
    pub fn load_config(&self) -> Result<SupervisorConfig, SupervisorError> {
        let mut config = match &self.settings {
            Some(path) => SupervisorConfig::from_json_file(path)?,
            None => SupervisorConfig::with_base_directory(match &self.base_dir {
                Some(dir) => dir.clone(),
                None => executable_dir()?,
            }),
        };

        if let Some(dir) = &self.base_dir {
            config.base_directory = dir.clone();
        }
        if let Some(binary) = &self.binary {
            config.binary_name = binary.clone();
        }
        if let Some(mount_root) = &self.mount_root {
            config.mount_root = mount_root.clone();
        }
        if let Some(secs) = self.grace_period {
            config.grace_period_ms = secs.saturating_mul(1000);
        }

        config.validate()?;
        Ok(config)
    }

    /// The `-c` path, or the configuration's default file
    pub fn config_path(&self, config: &SupervisorConfig) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| config.default_config_path())
    }
}

/// Directory holding the running executable
pub fn executable_dir() -> Result<PathBuf, SupervisorError> {
    let exe = std::env::current_exe().map_err(|e| {
        SupervisorError::ConfigurationError(format!("cannot locate the running executable: {e}"))
    })?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        SupervisorError::ConfigurationError(
            "running executable has no parent directory".to_string(),
        )
    })
}
