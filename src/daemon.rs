//! Daemonization and the PID file advisory lock.
//!
//! Grounded on the original daemon's `daemonize()`/`shutdown()` in
//! `bitz-server.cpp`: fork once, detach the session, redirect the standard
//! streams, change into the run directory, then take an exclusive advisory
//! lock on the PID file so a second instance refuses to start rather than
//! silently stealing the port.

use std::ffi::CString;
use std::fs::File;
use std::os::unix::io::{FromRawFd, RawFd};
use std::path::Path;

use crate::error::{IcapError, IcapResult};

fn path_to_cstring(path: &Path) -> IcapResult<CString> {
    CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|_| IcapError::Fatal(format!("path contains a NUL byte: {}", path.display())))
}

/// Fork into the background, detach from the controlling terminal, and
/// `chdir` into `run_dir`. Only the child returns; the parent calls
/// `std::process::exit(0)` directly, matching the original's behavior.
///
/// # Safety
///
/// Must be called before any threads are spawned: `fork()` in a
/// multi-threaded process only duplicates the calling thread, which is safe
/// here only because this runs at the very start of `main`.
pub unsafe fn daemonize(run_dir: &Path) -> IcapResult<()> {
    let pid = libc::fork();
    if pid < 0 {
        return Err(IcapError::Fatal("fork failed".into()));
    }
    if pid > 0 {
        std::process::exit(0);
    }

    libc::umask(0o027);
    if libc::setsid() < 0 {
        return Err(IcapError::Fatal("setsid failed".into()));
    }

    libc::close(libc::STDIN_FILENO);
    libc::close(libc::STDOUT_FILENO);
    libc::close(libc::STDERR_FILENO);

    let dir = path_to_cstring(run_dir)?;
    if libc::chdir(dir.as_ptr()) != 0 {
        return Err(IcapError::Fatal(format!(
            "chdir to {} failed",
            run_dir.display()
        )));
    }

    Ok(())
}

/// Holds the open, locked PID file for the process lifetime. The lock (and
/// the fd) is released when this is dropped, i.e. on process exit.
pub struct PidFileGuard {
    _file: File,
}

/// Open, exclusively lock, and write this process's PID to `pid_file`.
///
/// Fails with `IcapError::Fatal` if another instance already holds the lock,
/// mirroring the original's `lockf(F_TLOCK)` check.
pub fn acquire_pid_file(pid_file: &Path) -> IcapResult<PidFileGuard> {
    let path = path_to_cstring(pid_file)?;
    let fd: RawFd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR | libc::O_CREAT, 0o600) };
    if fd < 0 {
        return Err(IcapError::Fatal(format!(
            "could not open pid file: {}",
            pid_file.display()
        )));
    }
    let file = unsafe { File::from_raw_fd(fd) };

    if unsafe { libc::lockf(fd, libc::F_TLOCK, 0) } != 0 {
        return Err(IcapError::Fatal(format!(
            "could not lock pid file (already running?): {}",
            pid_file.display()
        )));
    }

    let pid_line = format!("{}\n", std::process::id());
    use std::io::Write;
    let mut file = file;
    file.set_len(0)
        .map_err(|e| IcapError::Fatal(format!("truncate pid file failed: {e}")))?;
    file.write_all(pid_line.as_bytes())
        .map_err(|e| IcapError::Fatal(format!("write pid file failed: {e}")))?;

    Ok(PidFileGuard { _file: file })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn acquire_pid_file_writes_own_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icapd.pid");
        let guard = acquire_pid_file(&path).unwrap();
        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
        drop(guard);
    }

    #[test]
    fn acquire_pid_file_creates_parent_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested-name.pid");
        let guard = acquire_pid_file(&path).unwrap();
        assert!(path.exists());
        drop(guard);
    }
}
