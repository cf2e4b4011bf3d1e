//! Structured logging.
//!
//! One root logger is built in `main` from the resolved configuration
//! (terminal-decorated, async-drained); subsystem loggers are derived from it
//! with fixed key-values so every line from a worker or connection carries its
//! `pid` and identity without the caller repeating it.

use std::fs::OpenOptions;
use std::path::Path;

use slog::{Drain, Logger, o};

/// Build the process-wide root logger.
///
/// `log_file` selects a file sink; `None` logs to stderr (used for `--debug`
/// foreground runs and whenever no `log_file` is configured). `debug` raises
/// the drain level to `Trace`, otherwise it is capped at `Info`.
pub fn build_root_logger(log_file: Option<&Path>, debug: bool) -> anyhow::Result<Logger> {
    let level = if debug {
        slog::Level::Trace
    } else {
        slog::Level::Info
    };

    let logger = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow::anyhow!("failed to open log file {}: {e}", path.display()))?;
            let decorator = slog_term::PlainDecorator::new(file);
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            Logger::root(drain, o!("pid" => std::process::id()))
        }
        None => {
            let decorator = slog_term::TermDecorator::new().build();
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            Logger::root(drain, o!("pid" => std::process::id()))
        }
    };
    Ok(logger)
}

/// Logger for the manager (parent) process.
pub fn manager_logger(root: &Logger) -> Logger {
    root.new(o!("subsystem" => "manager"))
}

/// Logger for a worker process.
pub fn worker_logger(root: &Logger, worker_id: u32) -> Logger {
    root.new(o!("subsystem" => "worker", "worker_id" => worker_id))
}

/// Logger for a single connection within a worker.
pub fn connection_logger(root: &Logger, worker_id: u32, peer: std::net::SocketAddr) -> Logger {
    root.new(o!("subsystem" => "connection", "worker_id" => worker_id, "peer_addr" => peer.to_string()))
}

/// Events raised by the manager over a worker's lifetime.
pub enum ManagerEvent {
    Started,
    WorkerSpawned,
    WorkerReaped,
    Draining,
    Stopped,
}

impl ManagerEvent {
    pub fn log(&self, logger: &Logger, message: &str) {
        match self {
            ManagerEvent::Started => slog::info!(logger, "{}", message; "event" => "started"),
            ManagerEvent::WorkerSpawned => {
                slog::info!(logger, "{}", message; "event" => "worker_spawned")
            }
            ManagerEvent::WorkerReaped => {
                slog::info!(logger, "{}", message; "event" => "worker_reaped")
            }
            ManagerEvent::Draining => slog::info!(logger, "{}", message; "event" => "draining"),
            ManagerEvent::Stopped => slog::info!(logger, "{}", message; "event" => "stopped"),
        }
    }
}

/// Events raised by a worker process.
pub enum WorkerEvent {
    Accepted,
    RequestServed,
    RequestLimitReached,
    Timeout,
    Error,
    Exiting,
}

impl WorkerEvent {
    pub fn log(&self, logger: &Logger, message: &str) {
        match self {
            WorkerEvent::Accepted => slog::debug!(logger, "{}", message; "event" => "accepted"),
            WorkerEvent::RequestServed => {
                slog::debug!(logger, "{}", message; "event" => "request_served")
            }
            WorkerEvent::RequestLimitReached => {
                slog::info!(logger, "{}", message; "event" => "request_limit_reached")
            }
            WorkerEvent::Timeout => slog::warn!(logger, "{}", message; "event" => "timeout"),
            WorkerEvent::Error => slog::error!(logger, "{}", message; "event" => "error"),
            WorkerEvent::Exiting => slog::info!(logger, "{}", message; "event" => "exiting"),
        }
    }
}

/// Events raised per connection.
pub enum ConnectionEvent {
    Accepted,
    RequestReceived,
    ResponseSent,
    Error,
    Closed,
}

impl ConnectionEvent {
    pub fn log(&self, logger: &Logger, message: &str) {
        match self {
            ConnectionEvent::Accepted => slog::info!(logger, "{}", message; "event" => "accepted"),
            ConnectionEvent::RequestReceived => {
                slog::debug!(logger, "{}", message; "event" => "request_received")
            }
            ConnectionEvent::ResponseSent => {
                slog::debug!(logger, "{}", message; "event" => "response_sent")
            }
            ConnectionEvent::Error => slog::error!(logger, "{}", message; "event" => "error"),
            ConnectionEvent::Closed => slog::info!(logger, "{}", message; "event" => "closed"),
        }
    }
}
