//! Async-signal-safe flags touched by the manager's signal handlers.
//!
//! Grounded on the original daemon's `init_signal_handlers`/`termination_handler`,
//! re-architected per the redesign notes: handlers write only these flags,
//! never call into the manager or logger directly. All non-trivial reaping and
//! shutdown work happens in the manager's main loop, which polls the flags
//! after `sigsuspend` returns.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

static TERMINATING: AtomicBool = AtomicBool::new(false);
static TERM_SIGNAL: AtomicI32 = AtomicI32::new(0);
static CHLD_PENDING: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_terminate(sig: libc::c_int) {
    TERMINATING.store(true, Ordering::SeqCst);
    TERM_SIGNAL.store(sig, Ordering::SeqCst);
}

extern "C" fn handle_chld(_sig: libc::c_int) {
    CHLD_PENDING.store(true, Ordering::SeqCst);
}

/// Install handlers for `SIGTERM`, `SIGQUIT`, `SIGINT`, and `SIGCHLD`.
///
/// Must be called once, after the manager has forked its worker pool but
/// before entering the supervision loop.
pub fn register() -> std::io::Result<()> {
    unsafe {
        install(libc::SIGTERM, handle_terminate as usize)?;
        install(libc::SIGQUIT, handle_terminate as usize)?;
        install(libc::SIGINT, handle_terminate as usize)?;
        install(libc::SIGCHLD, handle_chld as usize)?;
    }
    Ok(())
}

unsafe fn install(signum: libc::c_int, handler: usize) -> std::io::Result<()> {
    let mut action: libc::sigaction = std::mem::zeroed();
    action.sa_sigaction = handler;
    libc::sigemptyset(&mut action.sa_mask);
    action.sa_flags = 0;
    if libc::sigaction(signum, &action, std::ptr::null_mut()) != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Whether a termination signal has been received.
pub fn is_terminating() -> bool {
    TERMINATING.load(Ordering::SeqCst)
}

/// The signal number that triggered termination, or `0` if none has.
pub fn term_signal() -> i32 {
    TERM_SIGNAL.load(Ordering::SeqCst)
}

/// Consume the SIGCHLD-pending flag, returning whether it was set.
pub fn take_chld_pending() -> bool {
    CHLD_PENDING.swap(false, Ordering::SeqCst)
}

/// Block the signals this module handles, returning the previous mask so the
/// caller can restore it (used around `sigsuspend`, mirroring the original's
/// block-then-suspend loop).
pub fn block_handled_signals() -> libc::sigset_t {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGTERM);
        libc::sigaddset(&mut set, libc::SIGQUIT);
        libc::sigaddset(&mut set, libc::SIGINT);
        libc::sigaddset(&mut set, libc::SIGCHLD);
        let mut old: libc::sigset_t = std::mem::zeroed();
        libc::sigprocmask(libc::SIG_BLOCK, &set, &mut old);
        old
    }
}

/// Suspend the caller until a signal arrives, with `mask` as the temporarily
/// installed signal mask (typically the mask captured before the handled
/// signals were blocked).
pub fn suspend_until_signal(mask: &libc::sigset_t) {
    unsafe {
        libc::sigsuspend(mask);
    }
}

pub fn restore_mask(mask: &libc::sigset_t) {
    unsafe {
        libc::sigprocmask(libc::SIG_SETMASK, mask, std::ptr::null_mut());
    }
}
