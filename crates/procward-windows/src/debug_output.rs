/// Write `message` to the debugger output stream. Works before any sink
/// exists and without a console.
pub fn output_debug_string(message: &str) {
    use windows::Win32::System::Diagnostics::Debug::OutputDebugStringW;
    use windows::core::HSTRING;

    let text = HSTRING::from(format!("{message}\r\n"));
    // SAFETY: `text` is a valid NUL-terminated wide string for the call's duration
    unsafe { OutputDebugStringW(&text) };
}
