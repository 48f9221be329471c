use procward_core::{ProcessManager, ProcessManagerFactory};
use std::sync::Arc;
use tracing::info;

/// Platform-independent factory that selects the appropriate implementation at compile time
pub struct PlatformProcessManagerFactory;

impl ProcessManagerFactory for PlatformProcessManagerFactory {
    #[cfg(unix)]
    type Manager = procward_unix::UnixProcessManager;

    #[cfg(windows)]
    type Manager = procward_windows::WindowsProcessManager;

    fn create_process_manager() -> Self::Manager {
        #[cfg(unix)]
        return procward_unix::UnixProcessManagerFactory::create_process_manager();

        #[cfg(windows)]
        return procward_windows::WindowsProcessManagerFactory::create_process_manager();
    }

    fn platform_name() -> &'static str {
        #[cfg(unix)]
        return "unix";

        #[cfg(windows)]
        return "windows";
    }
}

/// Process manager for the current platform, ready to hand to a supervisor
pub fn create_process_manager() -> Arc<dyn ProcessManager> {
    info!(
        "Creating process manager for platform: {}",
        PlatformProcessManagerFactory::platform_name()
    );
    Arc::new(PlatformProcessManagerFactory::create_process_manager())
}
