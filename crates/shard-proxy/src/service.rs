//! Shard proxy service - main entry point of the core.
//!
//! Wires the coordinator, registry, dispatcher, resolver, assembler,
//! refresher and metadata cache together and implements [`ProxyApi`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::adapters::AddressShardCache;
use crate::algorithms::{FailurePolicy, ShardCoordinator};
use crate::dispatcher::{DispatchSettings, Dispatcher};
use crate::domain::{
    invariant_nodes_well_formed, invariant_topology_complete, shard_label, BatchSubmission,
    BlockQuery, DispatchResult, FanOutResult, Hyperblock, HyperblockMode, NodeRole, ProxyConfig,
    ProxyError, ReloadOutcome, RequestDescriptor, ResolvedTransaction, ShardId, ShardSelector,
};
use crate::hyperblock::HyperblockAssembler;
use crate::metadata::MetadataCache;
use crate::metrics::ProxyMetrics;
use crate::ports::{BackendClient, ProxyApi, TopologySource};
use crate::refresher::TopologyRefresher;
use crate::registry::ObserverRegistry;
use crate::resolver::CrossShardResolver;
use crate::sync_checker::NodeSyncChecker;

/// Observer path of single transaction submission.
pub const SEND_TRANSACTION_PATH: &str = "/transaction/send";

/// Observer path of batch transaction submission.
pub const SEND_MULTIPLE_TRANSACTIONS_PATH: &str = "/transaction/send-multiple";

/// Shard proxy service state
pub struct ShardProxyService {
    coordinator: Arc<ShardCoordinator>,
    cache: Arc<AddressShardCache>,
    registry: Arc<ObserverRegistry>,
    dispatcher: Dispatcher,
    resolver: CrossShardResolver,
    assembler: HyperblockAssembler,
    refresher: TopologyRefresher,
    metadata: Arc<MetadataCache>,
    sync_checker: NodeSyncChecker,
    metrics: Arc<ProxyMetrics>,
}

impl ShardProxyService {
    /// Create a new service.
    ///
    /// `config` is expected to have passed [`ProxyConfig::validate`]; the
    /// observer lists are checked here against the shard count.
    pub fn new(
        config: &ProxyConfig,
        backend: Arc<dyn BackendClient>,
        source: Arc<dyn TopologySource>,
    ) -> Result<Self, ProxyError> {
        let num_shards = config.general.num_shards;
        let coordinator = Arc::new(ShardCoordinator::new(num_shards)?);

        invariant_topology_complete(&config.observers, num_shards)?;
        invariant_nodes_well_formed(&config.full_history_observers, num_shards)?;

        let cache = Arc::new(AddressShardCache::new(config.general.address_cache_capacity));
        let registry = Arc::new(ObserverRegistry::new(config.topology()));
        let metrics = Arc::new(ProxyMetrics::new());

        let sync_checker = NodeSyncChecker::new(
            Arc::clone(&registry),
            Arc::clone(&backend),
            Arc::clone(&metrics),
            config.sync_check.clone(),
        );

        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            backend,
            FailurePolicy::from(&config.failure_policy),
            DispatchSettings::from(config),
            Arc::clone(&metrics),
        );

        let resolver = CrossShardResolver::new(
            dispatcher.clone(),
            Arc::clone(&coordinator),
            Arc::clone(&cache),
        );

        let mode = if config.general.notarized_at_source {
            HyperblockMode::NotarizedAtSource
        } else {
            HyperblockMode::Finalized
        };
        let assembler = HyperblockAssembler::new(dispatcher.clone(), mode);

        let refresher = TopologyRefresher::new(
            Arc::clone(&registry),
            source,
            Arc::clone(&cache),
            Arc::clone(&metrics),
            num_shards,
        );

        let metadata = Arc::new(MetadataCache::new(
            dispatcher.clone(),
            config.refresh.metadata_failure_threshold,
        ));

        info!(
            num_shards,
            observers = config.observers.len(),
            full_history_observers = config.full_history_observers.len(),
            ?mode,
            sync_checks = config.sync_check.enabled,
            "Shard proxy service created"
        );

        Ok(Self {
            coordinator,
            cache,
            registry,
            dispatcher,
            resolver,
            assembler,
            refresher,
            metadata,
            sync_checker,
            metrics,
        })
    }

    /// Address to shard mapping.
    pub fn coordinator(&self) -> &Arc<ShardCoordinator> {
        &self.coordinator
    }

    /// Address to shard cache.
    pub fn cache(&self) -> &Arc<AddressShardCache> {
        &self.cache
    }

    /// Observer registry.
    pub fn registry(&self) -> &Arc<ObserverRegistry> {
        &self.registry
    }

    /// Dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Topology refresher.
    pub fn refresher(&self) -> &TopologyRefresher {
        &self.refresher
    }

    /// Network metadata cache.
    pub fn metadata(&self) -> &Arc<MetadataCache> {
        &self.metadata
    }

    /// Observer sync-state checker.
    pub fn sync_checker(&self) -> &NodeSyncChecker {
        &self.sync_checker
    }

    /// Metrics.
    pub fn metrics(&self) -> &Arc<ProxyMetrics> {
        &self.metrics
    }

    fn sender_shard(&self, transaction: &Value) -> Result<ShardId, ProxyError> {
        let sender = transaction
            .get("sender")
            .and_then(Value::as_str)
            .ok_or_else(|| ProxyError::InvalidRequest("transaction has no sender".to_string()))?;
        self.cache.shard_of(&self.coordinator, sender)
    }

    async fn send_group(&self, shard: ShardId, group: Vec<Value>) -> Result<usize, ProxyError> {
        let count = group.len();
        let descriptor =
            RequestDescriptor::post(SEND_MULTIPLE_TRANSACTIONS_PATH, Value::Array(group))
                .non_idempotent();
        let result = self.dispatcher.send_to_shard(shard, &descriptor).await?;
        if !result.is_success() {
            let error = result.envelope().map(|env| env.error).unwrap_or_default();
            return Err(ProxyError::InvalidRequest(format!(
                "shard {} rejected batch: status {} {}",
                shard_label(shard),
                result.status,
                error
            )));
        }

        // Older observers omit the counter; assume the whole group was taken
        let sent = result.data_field::<usize>("numOfSentTxs").unwrap_or(count);
        debug!(shard = %shard_label(shard), sent, observer = %result.observer, "Batch delivered");
        Ok(sent)
    }
}

#[async_trait]
impl ProxyApi for ShardProxyService {
    fn compute_shard_id(&self, address: &str) -> Result<ShardId, ProxyError> {
        self.cache.shard_of(&self.coordinator, address)
    }

    async fn send(&self, descriptor: &RequestDescriptor) -> Result<DispatchResult, ProxyError> {
        self.dispatcher.send(descriptor).await
    }

    async fn fan_out(&self, descriptor: &RequestDescriptor) -> Result<FanOutResult, ProxyError> {
        self.dispatcher.fan_out(descriptor).await
    }

    async fn send_transaction(&self, transaction: Value) -> Result<DispatchResult, ProxyError> {
        let shard = self.sender_shard(&transaction)?;
        let descriptor = RequestDescriptor::post(SEND_TRANSACTION_PATH, transaction)
            .to(ShardSelector::Shard(shard))
            .non_idempotent();
        let result = self.dispatcher.send(&descriptor).await?;
        if result.is_success() {
            info!(shard = %shard_label(shard), observer = %result.observer, "Transaction sent");
        }
        Ok(result)
    }

    async fn send_multiple_transactions(
        &self,
        transactions: Vec<Value>,
    ) -> Result<BatchSubmission, ProxyError> {
        let mut submission = BatchSubmission::default();
        let mut groups: BTreeMap<ShardId, Vec<Value>> = BTreeMap::new();
        for (index, transaction) in transactions.into_iter().enumerate() {
            match self.sender_shard(&transaction) {
                Ok(shard) => groups.entry(shard).or_default().push(transaction),
                Err(err) => {
                    debug!(index, error = %err, "Skipping transaction with unusable sender");
                    submission.invalid.push(index);
                }
            }
        }

        let sends = groups
            .into_iter()
            .map(|(shard, group)| async move { (shard, self.send_group(shard, group).await) });
        for (shard, outcome) in join_all(sends).await {
            match outcome {
                Ok(sent) => {
                    submission.sent.insert(shard, sent);
                }
                Err(err) => {
                    warn!(shard = %shard_label(shard), error = %err, "Batch not delivered");
                    submission.failed.insert(shard, err);
                }
            }
        }

        info!(
            sent = submission.total_sent(),
            failed_shards = submission.failed.len(),
            invalid = submission.invalid.len(),
            "Batch submission finished"
        );
        Ok(submission)
    }

    async fn get_account(&self, address: &str) -> Result<DispatchResult, ProxyError> {
        let shard = self.cache.shard_of(&self.coordinator, address)?;
        let descriptor =
            RequestDescriptor::get(format!("/address/{}", address)).to(ShardSelector::Shard(shard));
        self.dispatcher.send(&descriptor).await
    }

    async fn get_transaction(
        &self,
        hash: &str,
        sender_hint: Option<&str>,
        with_results: bool,
    ) -> Result<ResolvedTransaction, ProxyError> {
        self.resolver
            .resolve_transaction(hash, sender_hint, with_results)
            .await
    }

    async fn get_transaction_status(
        &self,
        hash: &str,
        sender_hint: Option<&str>,
    ) -> Result<String, ProxyError> {
        self.resolver
            .resolve_transaction_status(hash, sender_hint)
            .await
    }

    async fn get_block(
        &self,
        shard: ShardId,
        query: BlockQuery,
        with_txs: bool,
    ) -> Result<DispatchResult, ProxyError> {
        let descriptor = RequestDescriptor::get(query.path(with_txs))
            .to(ShardSelector::Shard(shard))
            .full_history();
        self.dispatcher.send(&descriptor).await
    }

    async fn get_hyperblock_by_nonce(&self, nonce: u64) -> Result<Hyperblock, ProxyError> {
        self.assembler.by_nonce(nonce).await
    }

    async fn get_hyperblock_by_hash(&self, hash: &str) -> Result<Hyperblock, ProxyError> {
        self.assembler.by_hash(hash).await
    }

    async fn reload_observers(&self) -> ReloadOutcome {
        self.refresher.reload_from_source(NodeRole::Regular).await
    }

    async fn reload_full_history_observers(&self) -> ReloadOutcome {
        self.refresher.reload_from_source(NodeRole::FullHistory).await
    }

    async fn economics(&self) -> Result<Value, ProxyError> {
        if let Some(economics) = self.metadata.economics() {
            return Ok(economics);
        }
        self.metadata.refresh().await?;
        self.metadata
            .economics()
            .ok_or_else(|| ProxyError::NotFound("economics metrics".to_string()))
    }
}
