//! Cooperative shutdown: a signal flips a flag, the harvest loop polls it
//! between pages and stops after flushing what it already holds.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Check if shutdown was requested
pub fn is_shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// Request shutdown. Returns `true` if it had already been requested.
pub fn request_shutdown() -> bool {
    SHUTDOWN.swap(true, Ordering::Relaxed)
}

/// Install SIGINT/SIGTERM handlers.
///
/// First signal: set the flag so the current pass stops at the next page boundary.
/// Second signal: exit immediately with status 130.
pub fn install_signal_handlers() -> std::io::Result<()> {
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
        unsafe {
            signal_hook::low_level::register(signal, || {
                if request_shutdown() {
                    std::process::exit(130);
                }
            })?;
        }
    }
    Ok(())
}
