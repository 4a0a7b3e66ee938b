//! Best-effort process tuning for sampler workers.

/// Request a lower process priority.
///
/// Lowering priority keeps sampler workers from starving the learner on a
/// shared machine. Denied permission is a warning, never fatal.
#[cfg(unix)]
pub fn request_niceness(niceness: i32) {
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS as _, 0, niceness) };
    if rc != 0 {
        tracing::warn!(
            niceness,
            "could not lower process priority; continuing at current priority"
        );
    }
}

/// No-op on platforms without POSIX niceness.
#[cfg(not(unix))]
pub fn request_niceness(_niceness: i32) {}
