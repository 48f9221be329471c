//! Supervises a server binary as a child process: launch, liveness polling,
//! output forwarding and an orderly graceful-then-forced shutdown.

pub mod cli;
mod factory;
mod fallback;
mod service;

pub use cli::{Args, LogFormat};
pub use factory::{PlatformProcessManagerFactory, create_process_manager};
pub use fallback::report_fatal;
pub use service::{HostService, ServiceExit};

// Re-export core functionality
pub use procward_core::*;
