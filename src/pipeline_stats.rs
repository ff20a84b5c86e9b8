// Process-wide pipeline counters, shared by Arc and logged periodically.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct PipelineStats {
    datagrams_received: AtomicU64,
    receive_errors: AtomicU64,
    decode_errors: AtomicU64,
    observations_dispatched: AtomicU64,
    route_errors: AtomicU64,
    windows_sealed: AtomicU64,
    windows_published: AtomicU64,
    publish_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub datagrams_received: u64,
    pub receive_errors: u64,
    pub decode_errors: u64,
    pub observations_dispatched: u64,
    pub route_errors: u64,
    pub windows_sealed: u64,
    pub windows_published: u64,
    pub publish_failures: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn datagram_received(&self) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn receive_error(&self) {
        self.receive_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observation_dispatched(&self) {
        self.observations_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn route_error(&self) {
        self.route_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn window_sealed(&self) {
        self.windows_sealed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn window_published(&self) {
        self.windows_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            observations_dispatched: self.observations_dispatched.load(Ordering::Relaxed),
            route_errors: self.route_errors.load(Ordering::Relaxed),
            windows_sealed: self.windows_sealed.load(Ordering::Relaxed),
            windows_published: self.windows_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }

    /// Logs the current counters at INFO.
    pub fn log(&self) {
        let s = self.snapshot();
        tracing::info!(
            datagrams_received = s.datagrams_received,
            receive_errors = s.receive_errors,
            decode_errors = s.decode_errors,
            observations_dispatched = s.observations_dispatched,
            route_errors = s.route_errors,
            windows_sealed = s.windows_sealed,
            windows_published = s.windows_published,
            publish_failures = s.publish_failures,
            "pipeline stats"
        );
    }
}
