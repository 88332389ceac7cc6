//! Elevation detection
//!
//! True elevation requires a shell-execute style launch, which is
//! incompatible with redirected output capture; the process runner only
//! checks whether the current process already holds elevated rights and
//! otherwise runs the child best-effort with the current token.

/// Whether the current process is already running with elevated rights.
#[cfg(unix)]
pub fn process_is_elevated() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Whether the current process is already running with elevated rights.
///
/// Querying token membership needs a platform API call; without it the
/// conservative answer is "not elevated".
#[cfg(not(unix))]
pub fn process_is_elevated() -> bool {
    false
}
