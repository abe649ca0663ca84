//! Unix-specific process utilities

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

/// Ask a process to exit with SIGTERM. Returns false when it could not be
/// signalled, typically because it is already gone.
pub fn request_stop(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };

    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to send SIGTERM to {}: {}", pid, e);
            false
        }
    }
}
