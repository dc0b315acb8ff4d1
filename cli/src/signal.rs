//! Ctrl+C handling.
//!
//! The first interrupt only raises a flag that the command loops poll and turn
//! into a cancellation request. A second interrupt terminates the process.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

pub fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

pub fn install_handlers() {
    #[cfg(unix)]
    {
        // Safety: the handler only stores an atomic and resets the disposition.
        unsafe {
            libc::signal(libc::SIGINT, on_unix_signal as *const () as libc::sighandler_t);
            libc::signal(libc::SIGTERM, on_unix_signal as *const () as libc::sighandler_t);
        }
    }

    #[cfg(windows)]
    {
        // Safety: registers a handler that only touches an atomic.
        unsafe {
            windows_sys::Win32::System::Console::SetConsoleCtrlHandler(Some(on_console_event), 1);
        }
    }
}

#[cfg(unix)]
extern "C" fn on_unix_signal(sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
    unsafe {
        libc::signal(sig, libc::SIG_DFL);
    }
}

#[cfg(windows)]
unsafe extern "system" fn on_console_event(ctrl_type: u32) -> i32 {
    // CTRL_C_EVENT, CTRL_BREAK_EVENT, CTRL_CLOSE_EVENT
    if ctrl_type > 2 {
        return 0;
    }
    SHUTDOWN.store(true, Ordering::SeqCst);
    windows_sys::Win32::System::Console::SetConsoleCtrlHandler(Some(on_console_event), 0);
    1
}
