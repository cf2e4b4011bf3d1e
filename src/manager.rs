//! The pre-fork worker pool (§4.8).
//!
//! Grounded on `bitz::server::start`/`run` in the original daemon: the parent
//! binds the listening socket once, forks `children` workers that each run
//! their own accept loop against the inherited descriptor, and spends the
//! rest of its life in a `sigsuspend`-driven loop reaping dead children and
//! replacing them so the pool stays at full strength until a termination
//! signal arrives.

use std::net::TcpListener;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::time::Duration;

use slog::Logger;

use crate::config::Config;
use crate::error::{IcapError, IcapResult};
use crate::log::ManagerEvent;
use crate::modules::ModifierRegistry;
use crate::signal;
use crate::stats::IcapStats;
use crate::worker::{self, WorkerConfig};

/// A child worker process tracked by the manager.
struct WorkerSlot {
    pid: libc::pid_t,
}

/// Owns the listening socket and the pool of forked workers.
pub struct Manager {
    listen_fd: RawFd,
    children: usize,
    worker_config: WorkerConfig,
    workers: Vec<WorkerSlot>,
}

impl Manager {
    /// Bind the listening socket and record the pool shape from `config`.
    /// Does not fork yet; call [`Manager::spawn`] once logging and signal
    /// handlers are ready.
    pub fn bind(config: &Config) -> IcapResult<Self> {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = TcpListener::bind(addr)
            .map_err(|e| IcapError::Fatal(format!("failed to bind port {}: {e}", config.port)))?;
        let listen_fd = listener.as_raw_fd();
        // Leak the listener: its fd stays valid for the manager's lifetime and
        // every forked worker inherits it, reconstructing a `TcpListener` of
        // their own over the same descriptor.
        std::mem::forget(listener);

        Ok(Manager {
            listen_fd,
            children: config.children,
            worker_config: WorkerConfig {
                read_timeout: Duration::from_secs(config.read_timeout_secs),
                max_requests: config.max_requests,
            },
            workers: Vec::new(),
        })
    }

    /// Fork `children` worker processes. Returns in the parent only; each
    /// forked child runs its worker loop and exits the process instead of
    /// returning.
    pub fn spawn(&mut self, registry: &ModifierRegistry, stats: &IcapStats, logger: &Logger) -> IcapResult<()> {
        for _ in 0..self.children {
            self.spawn_one(registry, stats, logger)?;
        }
        Ok(())
    }

    fn spawn_one(&mut self, registry: &ModifierRegistry, stats: &IcapStats, logger: &Logger) -> IcapResult<()> {
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            return Err(IcapError::Fatal(format!(
                "fork failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        if pid == 0 {
            // Child: run the worker loop against the inherited listening
            // socket and exit; it never returns into the manager's caller.
            let listener = unsafe { TcpListener::from_raw_fd(self.listen_fd) };
            let worker_logger = crate::log::worker_logger(logger, std::process::id());
            let code = match worker::run(&listener, registry, &self.worker_config, stats, &worker_logger) {
                Ok(()) => 0,
                Err(err) => {
                    slog::error!(worker_logger, "worker exiting on error"; "error" => err.to_string());
                    1
                }
            };
            std::mem::forget(listener);
            std::process::exit(code);
        }

        self.workers.push(WorkerSlot { pid });
        ManagerEvent::WorkerSpawned.log(logger, &format!("spawned worker {pid}"));
        Ok(())
    }

    /// Reap any exited children (non-blocking) and respawn to maintain the
    /// configured pool size. Called after `sigsuspend` wakes the manager.
    pub fn reap_and_respawn(&mut self, registry: &ModifierRegistry, stats: &IcapStats, logger: &Logger) -> IcapResult<()> {
        while let Some(pid) = reap_one() {
            self.workers.retain(|w| w.pid != pid);
            ManagerEvent::WorkerReaped.log(logger, &format!("worker {pid} exited"));
        }
        while self.workers.len() < self.children {
            self.spawn_one(registry, stats, logger)?;
        }
        Ok(())
    }

    /// Send `SIGTERM` to every live worker and wait (bounded) for them to
    /// exit, reaping each as it does.
    pub fn shutdown(&mut self, logger: &Logger) {
        ManagerEvent::Draining.log(logger, "sending SIGTERM to workers");
        for worker in &self.workers {
            unsafe {
                libc::kill(worker.pid, libc::SIGTERM);
            }
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !self.workers.is_empty() && std::time::Instant::now() < deadline {
            if let Some(pid) = reap_one() {
                self.workers.retain(|w| w.pid != pid);
                ManagerEvent::WorkerReaped.log(logger, &format!("worker {pid} exited"));
            } else {
                std::thread::sleep(Duration::from_millis(50));
            }
        }
        for worker in &self.workers {
            unsafe {
                libc::kill(worker.pid, libc::SIGKILL);
            }
            let _ = reap_one();
        }
        ManagerEvent::Stopped.log(logger, "all workers stopped");
    }

    /// Run the supervision loop until a termination signal is observed.
    /// Mirrors `bitz::server::run`'s block-sigsuspend-unblock cycle.
    pub fn run(&mut self, registry: &ModifierRegistry, stats: &IcapStats, logger: &Logger) -> IcapResult<()> {
        ManagerEvent::Started.log(logger, "manager ready, entering supervision loop");
        let blocked = signal::block_handled_signals();
        while !signal::is_terminating() {
            signal::suspend_until_signal(&blocked);
            if signal::is_terminating() {
                break;
            }
            if signal::take_chld_pending() {
                self.reap_and_respawn(registry, stats, logger)?;
            }
        }
        self.shutdown(logger);
        Ok(())
    }
}

/// Reap one exited child, if any is waiting, without blocking.
fn reap_one() -> Option<libc::pid_t> {
    let mut status: libc::c_int = 0;
    let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
    if pid > 0 {
        Some(pid)
    } else {
        None
    }
}
