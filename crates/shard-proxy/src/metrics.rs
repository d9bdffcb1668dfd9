//! Proxy metrics.
//!
//! Plain atomic counters, read by the runtime's `/metrics` route. Latency is
//! tracked as a running sum and count (no histograms).

#![allow(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::{json, Value};

/// Shard proxy metrics
#[derive(Default)]
pub struct ProxyMetrics {
    // Logical request counters
    pub requests_total: AtomicU64,
    pub requests_success: AtomicU64,
    pub requests_error: AtomicU64,

    // Attempt counters
    pub attempts_total: AtomicU64,
    pub node_failures: AtomicU64,
    pub rejections: AtomicU64,
    pub shards_exhausted: AtomicU64,
    pub gateway_timeouts: AtomicU64,

    // Aggregation counters
    pub fan_outs: AtomicU64,
    pub hyperblocks_assembled: AtomicU64,
    pub hyperblocks_incomplete: AtomicU64,
    pub receiver_followups: AtomicU64,
    pub degraded_resolutions: AtomicU64,

    // Topology counters
    pub topology_reloads: AtomicU64,
    pub topology_rejections: AtomicU64,

    // Sync checks (out_of_sync_observers is a gauge)
    pub sync_checks: AtomicU64,
    pub out_of_sync_observers: AtomicU64,

    // Latency tracking
    pub total_latency_ms: AtomicU64,
    pub request_count_for_latency: AtomicU64,

    // Node failures per observer URL
    observer_failures: DashMap<String, u64>,
}

impl std::fmt::Debug for ProxyMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyMetrics")
            .field("requests_total", &self.requests_total.load(Ordering::Relaxed))
            .field("node_failures", &self.node_failures.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ProxyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished logical request
    pub fn record_request(&self, success: bool, latency_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.requests_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_error.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.request_count_for_latency.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one backend attempt
    pub fn record_attempt(&self) {
        self.attempts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a node failure of `observer`
    pub fn record_node_failure(&self, observer: &str) {
        self.node_failures.fetch_add(1, Ordering::Relaxed);
        *self.observer_failures.entry(observer.to_string()).or_insert(0) += 1;
    }

    pub fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self) {
        self.shards_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gateway_timeout(&self) {
        self.gateway_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fan_out(&self) {
        self.fan_outs.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a hyperblock assembly outcome
    pub fn record_hyperblock(&self, complete: bool) {
        if complete {
            self.hyperblocks_assembled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hyperblocks_incomplete.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a receiver-shard follow-up call and whether it degraded
    pub fn record_followup(&self, degraded: bool) {
        self.receiver_followups.fetch_add(1, Ordering::Relaxed);
        if degraded {
            self.degraded_resolutions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a topology reload outcome
    pub fn record_reload(&self, accepted: bool) {
        if accepted {
            self.topology_reloads.fetch_add(1, Ordering::Relaxed);
        } else {
            self.topology_rejections.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a finished sync check and how many observers lag behind
    pub fn record_sync_check(&self, out_of_sync: usize) {
        self.sync_checks.fetch_add(1, Ordering::Relaxed);
        self.out_of_sync_observers
            .store(out_of_sync as u64, Ordering::Relaxed);
    }

    /// Node failures attributed to one observer
    pub fn observer_failures(&self, observer: &str) -> u64 {
        self.observer_failures.get(observer).map(|v| *v).unwrap_or(0)
    }

    /// Get average latency in ms
    pub fn average_latency_ms(&self) -> f64 {
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        let count = self.request_count_for_latency.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Snapshot as JSON
    pub fn to_json(&self) -> Value {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let mut observers: Vec<(String, u64)> = self
            .observer_failures
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        observers.sort();

        json!({
            "requests": {
                "total": load(&self.requests_total),
                "success": load(&self.requests_success),
                "error": load(&self.requests_error),
                "average_latency_ms": self.average_latency_ms(),
            },
            "attempts": {
                "total": load(&self.attempts_total),
                "node_failures": load(&self.node_failures),
                "rejections": load(&self.rejections),
                "shards_exhausted": load(&self.shards_exhausted),
                "gateway_timeouts": load(&self.gateway_timeouts),
            },
            "aggregation": {
                "fan_outs": load(&self.fan_outs),
                "hyperblocks_assembled": load(&self.hyperblocks_assembled),
                "hyperblocks_incomplete": load(&self.hyperblocks_incomplete),
                "receiver_followups": load(&self.receiver_followups),
                "degraded_resolutions": load(&self.degraded_resolutions),
            },
            "topology": {
                "reloads": load(&self.topology_reloads),
                "rejections": load(&self.topology_rejections),
            },
            "sync": {
                "checks": load(&self.sync_checks),
                "out_of_sync_observers": load(&self.out_of_sync_observers),
            },
            "observer_failures": observers
                .into_iter()
                .map(|(url, count)| (url, Value::from(count)))
                .collect::<serde_json::Map<String, Value>>(),
        })
    }
}
