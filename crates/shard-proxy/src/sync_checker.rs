//! # Node Sync Checker
//!
//! Polls `/node/status` of every configured observer and tells the registry
//! which ones lag behind their shard. Lagging nodes are demoted in candidate
//! order, never removed.
//!
//! Runs on a timer; a transport failure seen by the dispatcher brings the
//! next check forward. With checks disabled every node counts as synced.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::algorithms::{parse_node_status, NODE_STATUS_PATH};
use crate::domain::{shard_label, HttpMethod, NodeRole, ObserverNode, SyncCheckConfig};
use crate::metrics::ProxyMetrics;
use crate::ports::{BackendClient, BackendRequest};
use crate::registry::ObserverRegistry;

/// Outcome of one pass over the observers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Observers asked
    pub checked: usize,
    /// Observers out of sync after the pass, sorted
    pub out_of_sync: Vec<String>,
}

/// Periodic observer sync-state checker.
#[derive(Clone)]
pub struct NodeSyncChecker {
    registry: Arc<ObserverRegistry>,
    backend: Arc<dyn BackendClient>,
    metrics: Arc<ProxyMetrics>,
    config: SyncCheckConfig,
}

impl NodeSyncChecker {
    /// Create a checker.
    pub fn new(
        registry: Arc<ObserverRegistry>,
        backend: Arc<dyn BackendClient>,
        metrics: Arc<ProxyMetrics>,
        config: SyncCheckConfig,
    ) -> Self {
        Self {
            registry,
            backend,
            metrics,
            config,
        }
    }

    /// Whether checks run at all.
    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Check every observer of both roles once, concurrently, and apply the
    /// result to the registry.
    pub async fn check_all(&self) -> SyncReport {
        let topology = self.registry.topology();
        let mut seen = HashSet::new();
        let nodes: Vec<ObserverNode> = [NodeRole::Regular, NodeRole::FullHistory]
            .into_iter()
            .flat_map(|role| topology.all(role))
            .filter(|node| seen.insert(node.url.clone()))
            .collect();

        let states: Vec<(String, bool)> =
            join_all(nodes.iter().map(|node| async move {
                (node.url.clone(), self.is_node_synced(node).await)
            }))
            .await;

        let lagging = self.registry.apply_sync_states(&states);
        self.metrics.record_sync_check(lagging);
        let report = SyncReport {
            checked: states.len(),
            out_of_sync: self.registry.out_of_sync(),
        };
        info!(
            checked = report.checked,
            out_of_sync = lagging,
            "Observer sync check finished"
        );
        report
    }

    /// One status call. Any failure counts as out of sync.
    async fn is_node_synced(&self, node: &ObserverNode) -> bool {
        let request = BackendRequest {
            method: HttpMethod::Get,
            path: NODE_STATUS_PATH.to_string(),
            body: None,
        };
        let response = match timeout(self.config.status_timeout, self.backend.execute(node, &request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(observer = %node.url, error = %err, "Cannot get node status, marking out of sync");
                return false;
            }
            Err(_) => {
                warn!(observer = %node.url, timeout = ?self.config.status_timeout, "Node status timed out, marking out of sync");
                return false;
            }
        };

        match parse_node_status(response.status, &response.body) {
            Ok(metrics) => {
                let synced = metrics.is_synced(self.config.nonce_threshold);
                debug!(
                    observer = %node.url,
                    shard = %shard_label(node.shard),
                    nonce = metrics.nonce,
                    probable_highest_nonce = metrics.probable_highest_nonce,
                    vm_queries_ready = metrics.vm_queries_ready,
                    fallback = node.fallback,
                    synced,
                    "Node status"
                );
                synced
            }
            Err(reason) => {
                warn!(observer = %node.url, %reason, "Unreadable node status, marking out of sync");
                false
            }
        }
    }

    /// Check at startup, then every `interval` or on request, until shutdown.
    pub fn spawn_periodic(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let checker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(checker.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = checker.registry.sync_check_requested() => {
                        info!("Observer failure reported, checking sync state early");
                        ticker.reset();
                    }
                    _ = shutdown.changed() => {
                        info!("Sync checker shutting down");
                        break;
                    }
                }
                checker.check_all().await;
            }
        })
    }
}
