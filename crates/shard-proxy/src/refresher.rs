//! # Topology Refresher
//!
//! Validates a new observer list and installs it in the registry.
//!
//! Triggered by an administrative action or a timer, never by dispatch
//! failures. A rejected or failed reload leaves the running topology alone.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapters::AddressShardCache;
use crate::domain::{
    invariant_nodes_well_formed, invariant_topology_complete, NodeRole, ObserverNode, ProxyError,
    ReloadOutcome,
};
use crate::metrics::ProxyMetrics;
use crate::ports::TopologySource;
use crate::registry::ObserverRegistry;

/// Reloads observer topologies.
#[derive(Clone)]
pub struct TopologyRefresher {
    registry: Arc<ObserverRegistry>,
    source: Arc<dyn TopologySource>,
    cache: Arc<AddressShardCache>,
    metrics: Arc<ProxyMetrics>,
    num_shards: u32,
    // Serializes validate + swap so two reloads cannot interleave
    reload_lock: Arc<Mutex<()>>,
}

impl TopologyRefresher {
    /// Create a refresher.
    pub fn new(
        registry: Arc<ObserverRegistry>,
        source: Arc<dyn TopologySource>,
        cache: Arc<AddressShardCache>,
        metrics: Arc<ProxyMetrics>,
        num_shards: u32,
    ) -> Self {
        Self {
            registry,
            source,
            cache,
            metrics,
            num_shards,
            reload_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Validate `nodes` and install them as the node list of `role`.
    ///
    /// Regular lists must cover every shard plus meta. Full-history lists
    /// may be partial (shards without them fall back to regular nodes).
    /// On success the address cache is flushed.
    pub fn reload(
        &self,
        role: NodeRole,
        nodes: Vec<ObserverNode>,
    ) -> Result<ReloadOutcome, ProxyError> {
        let _guard = self.reload_lock.lock();

        let validation = match role {
            NodeRole::Regular => invariant_topology_complete(&nodes, self.num_shards),
            NodeRole::FullHistory => invariant_nodes_well_formed(&nodes, self.num_shards),
        };
        if let Err(err) = validation {
            warn!(%role, error = %err, "Topology reload rejected, keeping current topology");
            self.metrics.record_reload(false);
            return Err(err);
        }

        let count = nodes.len();
        let next = self.registry.topology().with_role(role, nodes);
        self.registry.replace_all(next);
        self.cache.flush();
        self.metrics.record_reload(true);

        info!(%role, observers = count, generation = self.registry.generation(), "Topology reloaded");
        Ok(ReloadOutcome::reloaded(format!(
            "{} {} observers loaded",
            count, role
        )))
    }

    /// Pull the node list of `role` from the topology source and reload it.
    ///
    /// Never fails: validation errors become `Rejected`, source errors `Failed`.
    pub async fn reload_from_source(&self, role: NodeRole) -> ReloadOutcome {
        let description = format!("reload {} observers", role);
        let nodes = match self.source.load(role).await {
            Ok(nodes) => nodes,
            Err(err) => {
                warn!(%role, error = %err, "Topology source failed, keeping current topology");
                self.metrics.record_reload(false);
                return ReloadOutcome::failed(description, err.to_string());
            }
        };

        match self.reload(role, nodes) {
            Ok(outcome) => outcome,
            Err(err) => ReloadOutcome::rejected(description, err.to_string()),
        }
    }

    /// Reload both roles from the source every `interval` until shutdown.
    pub fn spawn_periodic(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let refresher = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately; startup already loaded the topology
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for role in [NodeRole::Regular, NodeRole::FullHistory] {
                            let outcome = refresher.reload_from_source(role).await;
                            if !outcome.accepted() {
                                warn!(%role, error = %outcome.error, "Periodic topology reload not applied");
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("Topology refresher shutting down");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ReloadStatus, ShardId, Topology, METACHAIN_SHARD_ID};
    use crate::ports::{StaticTopologySource, TopologyError};

    fn nodes(prefix: &str, num_shards: u32) -> Vec<ObserverNode> {
        (0..num_shards)
            .chain(std::iter::once(METACHAIN_SHARD_ID))
            .map(|shard| ObserverNode::new(format!("http://{}-{}", prefix, shard), shard))
            .collect()
    }

    fn setup() -> (TopologyRefresher, Arc<ObserverRegistry>, Arc<StaticTopologySource>, Arc<AddressShardCache>) {
        let registry = Arc::new(ObserverRegistry::new(Topology::from_nodes(nodes("old", 2))));
        let source = Arc::new(StaticTopologySource::new(nodes("new", 2)));
        let cache = Arc::new(AddressShardCache::new(16));
        let refresher = TopologyRefresher::new(
            registry.clone(),
            source.clone(),
            cache.clone(),
            Arc::new(ProxyMetrics::new()),
            2,
        );
        (refresher, registry, source, cache)
    }

    fn first_url(registry: &ObserverRegistry, shard: ShardId) -> String {
        registry.observers(shard, NodeRole::Regular, false).unwrap().nodes[0].url.clone()
    }

    #[test]
    fn test_valid_reload_swaps_and_flushes_cache() {
        let (refresher, registry, _, cache) = setup();
        cache.insert("addr", 1);

        let outcome = refresher.reload(NodeRole::Regular, nodes("new", 2)).unwrap();

        assert!(outcome.accepted());
        assert_eq!(first_url(&registry, 0), "http://new-0");
        assert_eq!(registry.generation(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_missing_shard_rejected_keeps_old() {
        let (refresher, registry, _, cache) = setup();
        cache.insert("addr", 1);
        let mut incomplete = nodes("new", 2);
        incomplete.retain(|n| n.shard != 1);

        let err = refresher.reload(NodeRole::Regular, incomplete).unwrap_err();

        assert!(matches!(err, ProxyError::InvalidTopology(_)));
        assert_eq!(first_url(&registry, 1), "http://old-1");
        assert_eq!(registry.generation(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_full_history_reload_keeps_regular() {
        let (refresher, registry, _, _) = setup();
        let history = vec![ObserverNode::new("http://hist-0", 0)];

        refresher.reload(NodeRole::FullHistory, history).unwrap();

        assert_eq!(first_url(&registry, 0), "http://old-0");
        let selection = registry.observers(0, NodeRole::FullHistory, false).unwrap();
        assert_eq!(selection.nodes[0].url, "http://hist-0");
        assert_eq!(selection.nodes[0].role, NodeRole::FullHistory);
    }

    #[tokio::test]
    async fn test_reload_from_source_outcomes() {
        let (refresher, registry, source, _) = setup();

        let outcome = refresher.reload_from_source(NodeRole::Regular).await;
        assert_eq!(outcome.status, ReloadStatus::Reloaded);
        assert_eq!(first_url(&registry, 0), "http://new-0");

        source.set(NodeRole::Regular, vec![ObserverNode::new("http://only-0", 0)]);
        let outcome = refresher.reload_from_source(NodeRole::Regular).await;
        assert_eq!(outcome.status, ReloadStatus::Rejected);
        assert!(!outcome.error.is_empty());

        source.fail_with(Some(TopologyError::Unavailable("file gone".into())));
        let outcome = refresher.reload_from_source(NodeRole::Regular).await;
        assert_eq!(outcome.status, ReloadStatus::Failed);
        assert!(outcome.error.contains("file gone"));
        assert_eq!(first_url(&registry, 0), "http://new-0");
    }

    #[tokio::test]
    async fn test_periodic_reload_stops_on_shutdown() {
        let (refresher, registry, _, _) = setup();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = refresher.spawn_periodic(Duration::from_millis(20), shutdown_rx);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(first_url(&registry, 0), "http://new-0");

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
