use std::sync::atomic::{AtomicU64, Ordering};

/// Server counters, updated lock-free from the multiplexer and the workers.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    connections_accepted: AtomicU64,
    connections_pruned: AtomicU64,
    requests_handled: AtomicU64,
    protocol_failures: AtomicU64,
    auth_failures: AtomicU64,
    execution_faults: AtomicU64,
}

/// Point-in-time copy of [`ServerMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_accepted: u64,
    pub connections_pruned: u64,
    pub requests_handled: u64,
    pub protocol_failures: u64,
    pub auth_failures: u64,
    pub execution_faults: u64,
}

impl MetricsSnapshot {
    pub fn live_connections(&self) -> u64 {
        self.connections_accepted
            .saturating_sub(self.connections_pruned)
    }
}

impl ServerMetrics {
    pub fn on_connection(&self) -> u64 {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn on_prune(&self) {
        self.connections_pruned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_request(&self) {
        self.requests_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_protocol_failure(&self) {
        self.protocol_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_execution_fault(&self) {
        self.execution_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_pruned: self.connections_pruned.load(Ordering::Relaxed),
            requests_handled: self.requests_handled.load(Ordering::Relaxed),
            protocol_failures: self.protocol_failures.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            execution_faults: self.execution_faults.load(Ordering::Relaxed),
        }
    }
}
