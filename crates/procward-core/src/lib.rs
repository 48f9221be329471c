//! procward core - platform-independent supervision of a single child process
//!
//! This crate provides the configuration, error taxonomy, process abstractions and
//! the supervision components (path resolution, start, health monitoring, shutdown)
//! that the platform-specific crates plug into.

mod config;
mod error;
mod monitor;
mod output;
mod path;
mod process;
mod shutdown;
mod sink;
mod supervisor;

pub use config::*;
pub use error::*;
pub use monitor::HealthMonitor;
pub use output::{LossyLineCodec, forward_output};
pub use path::*;
pub use process::*;
pub use shutdown::ShutdownCoordinator;
pub use sink::*;
pub use supervisor::{ProcessState, ProcessSupervisor, SupervisedProcess};
