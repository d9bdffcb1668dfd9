//! # Inbound Ports
//!
//! API trait defining what the shard proxy core can do. Callers (an HTTP
//! layer, the admin router) hand in already-parsed values and receive
//! results or typed errors; no HTTP framing happens here.

use crate::domain::{
    BatchSubmission, BlockQuery, DispatchResult, FanOutResult, Hyperblock, ProxyError,
    ReloadOutcome, RequestDescriptor, ResolvedTransaction, ShardId,
};
use async_trait::async_trait;
use serde_json::Value;

/// Shard proxy API - inbound port.
#[async_trait]
pub trait ProxyApi: Send + Sync {
    /// Shard owning an address.
    fn compute_shard_id(&self, address: &str) -> Result<ShardId, ProxyError>;

    /// Forward a single-shard request.
    async fn send(&self, descriptor: &RequestDescriptor) -> Result<DispatchResult, ProxyError>;

    /// Forward a request to every shard, results keyed by shard.
    async fn fan_out(&self, descriptor: &RequestDescriptor) -> Result<FanOutResult, ProxyError>;

    /// Submit one transaction to its sender's shard.
    async fn send_transaction(&self, transaction: Value) -> Result<DispatchResult, ProxyError>;

    /// Submit a batch, one call per sender shard.
    async fn send_multiple_transactions(
        &self,
        transactions: Vec<Value>,
    ) -> Result<BatchSubmission, ProxyError>;

    /// Account state from the owning shard.
    async fn get_account(&self, address: &str) -> Result<DispatchResult, ProxyError>;

    /// Transaction by hash, resolved across shards.
    async fn get_transaction(
        &self,
        hash: &str,
        sender_hint: Option<&str>,
        with_results: bool,
    ) -> Result<ResolvedTransaction, ProxyError>;

    /// Status string of a transaction.
    async fn get_transaction_status(
        &self,
        hash: &str,
        sender_hint: Option<&str>,
    ) -> Result<String, ProxyError>;

    /// Block of one shard (full-history nodes preferred).
    async fn get_block(
        &self,
        shard: ShardId,
        query: BlockQuery,
        with_txs: bool,
    ) -> Result<DispatchResult, ProxyError>;

    /// Hyperblock by meta block nonce.
    async fn get_hyperblock_by_nonce(&self, nonce: u64) -> Result<Hyperblock, ProxyError>;

    /// Hyperblock by meta block hash.
    async fn get_hyperblock_by_hash(&self, hash: &str) -> Result<Hyperblock, ProxyError>;

    /// Reload regular observers from the topology source.
    async fn reload_observers(&self) -> ReloadOutcome;

    /// Reload full-history observers from the topology source.
    async fn reload_full_history_observers(&self) -> ReloadOutcome;

    /// Economics metrics (cached, fetched on first use).
    async fn economics(&self) -> Result<Value, ProxyError>;
}
