/// Last-resort report for a fatal error that no log sink could take.
///
/// Goes to the debugger output channel on Windows, where a service has no
/// console, and to stderr elsewhere.
pub fn report_fatal(message: &str) {
    #[cfg(windows)]
    procward_windows::output_debug_string(&format!("procward: {message}"));

    #[cfg(not(windows))]
    eprintln!("procward: {message}");
}
