//! PID 1 environment setup: TTY signal ignores and subreaper registration.
//!
//! Uses `sigaction` (not `signal`) for the ignores: `sigaction` does not
//! reset the disposition after first delivery and has well-defined behavior
//! across platforms.

use nix::unistd::getpid;

/// Whether this process is the container's PID 1.
pub fn is_pid1() -> bool {
    getpid().as_raw() == 1
}

/// Install a `sigaction` disposition for the given signal with `SA_RESTART`.
fn set_disposition(sig: libc::c_int, handler: libc::sighandler_t) {
    // SAFETY: zeroed sigaction is valid; we fill sa_sigaction and sa_flags.
    let mut sa: libc::sigaction = unsafe { std::mem::zeroed() };
    sa.sa_sigaction = handler;
    sa.sa_flags = libc::SA_RESTART;
    // SAFETY: sa is properly initialized, sig is a valid signal number.
    unsafe {
        libc::sigaction(sig, &sa, std::ptr::null_mut());
    }
}

/// Ignore the job-control and pipe signals a PID 1 must not die from.
///
/// - SIGTTIN/SIGTTOU: prevent blocking on TTY operations
/// - SIGPIPE: prevent termination when writing to closed pipes
///
/// SIGCHLD keeps its default disposition so `waitpid` in the supervisor
/// observes every child exit; `SIG_IGN` would make the kernel auto-reap and
/// race the supervisor's status capture.
pub fn install_tty_ignores() {
    set_disposition(libc::SIGTTIN, libc::SIG_IGN);
    set_disposition(libc::SIGTTOU, libc::SIG_IGN);
    set_disposition(libc::SIGPIPE, libc::SIG_IGN);
}

/// Register this process as a child subreaper.
///
/// When the shim is not PID 1 (development invocation outside a container),
/// orphaned grandchildren would otherwise reparent past it to the real init
/// and escape its reaping duty.
pub fn become_subreaper() -> nix::Result<()> {
    nix::sys::prctl::set_child_subreaper(true)
}
