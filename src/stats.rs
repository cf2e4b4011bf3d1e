//! Statistics collection for the ICAP server.
//!
//! Counters are plain atomics shared via `Arc` across one worker's lifetime.
//! There is no network-facing metrics exporter; the counters exist for the
//! event log and for tests.

use std::sync::atomic::{AtomicU64, Ordering};

/// ICAP server statistics.
#[derive(Default)]
pub struct IcapStats {
    connections_total: AtomicU64,
    requests_total: AtomicU64,
    responses_total: AtomicU64,
    errors_total: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

impl IcapStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_connections(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_requests(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_responses(&self) {
        self.responses_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_errors(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_in(&self, n: u64) {
        self.bytes_in.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_out(&self, n: u64) {
        self.bytes_out.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            responses_total: self.responses_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time read of [`IcapStats`], for logging or tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_total: u64,
    pub requests_total: u64,
    pub responses_total: u64,
    pub errors_total: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = IcapStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn counters_accumulate() {
        let stats = IcapStats::new();
        stats.increment_connections();
        stats.increment_requests();
        stats.increment_requests();
        stats.add_bytes_in(100);
        stats.add_bytes_out(42);
        let snap = stats.snapshot();
        assert_eq!(snap.connections_total, 1);
        assert_eq!(snap.requests_total, 2);
        assert_eq!(snap.bytes_in, 100);
        assert_eq!(snap.bytes_out, 42);
    }
}
