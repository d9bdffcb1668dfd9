//! # Cross-Shard Resolver
//!
//! Finds the shard that knows a transaction and, for cross-shard
//! transactions, prefers the receiver shard's (more final) view.
//!
//! ## Call budget
//!
//! - With a sender hint: sender shard, then at most one receiver call (2).
//! - Without a hint: one fan-out over every shard plus meta (`num_shards + 1`).
//!   The receiver's answer is already part of the fan-out, so no follow-up
//!   call is made.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::adapters::AddressShardCache;
use crate::algorithms::{interpret_lookup, needs_receiver_lookup, transaction_path, ShardCoordinator, TxLookup};
use crate::domain::{
    shard_label, DispatchResult, ProxyError, RequestDescriptor, ResolvedTransaction, ShardId,
    ShardSelector, TransactionInfo,
};
use crate::dispatcher::Dispatcher;

type Found = (TransactionInfo, DispatchResult);

/// Resolves transactions whose owning shard is not known up front.
#[derive(Clone)]
pub struct CrossShardResolver {
    dispatcher: Dispatcher,
    coordinator: Arc<ShardCoordinator>,
    cache: Arc<AddressShardCache>,
}

impl CrossShardResolver {
    /// Create a resolver.
    pub fn new(
        dispatcher: Dispatcher,
        coordinator: Arc<ShardCoordinator>,
        cache: Arc<AddressShardCache>,
    ) -> Self {
        Self {
            dispatcher,
            coordinator,
            cache,
        }
    }

    /// Look up a transaction by hash.
    ///
    /// Returns `NotFound` when every shard answered and none knows the hash.
    /// When some shards failed and none knows it, the absence is not proven
    /// and `PartialFanOut` is returned instead.
    pub async fn resolve_transaction(
        &self,
        hash: &str,
        sender_hint: Option<&str>,
        with_results: bool,
    ) -> Result<ResolvedTransaction, ProxyError> {
        let descriptor = RequestDescriptor::get(transaction_path(hash, with_results));
        match sender_hint {
            Some(sender) => self.resolve_with_hint(hash, sender, &descriptor).await,
            None => self.resolve_by_fan_out(hash, &descriptor).await,
        }
    }

    /// Status string of a transaction (`pending`, `success`, ...).
    pub async fn resolve_transaction_status(
        &self,
        hash: &str,
        sender_hint: Option<&str>,
    ) -> Result<String, ProxyError> {
        Ok(self
            .resolve_transaction(hash, sender_hint, false)
            .await?
            .info
            .status)
    }

    async fn resolve_with_hint(
        &self,
        hash: &str,
        sender: &str,
        descriptor: &RequestDescriptor,
    ) -> Result<ResolvedTransaction, ProxyError> {
        let sender_shard = self.cache.shard_of(&self.coordinator, sender)?;
        let result = self.dispatcher.send_to_shard(sender_shard, descriptor).await?;
        let info = match interpret_lookup(&result)? {
            TxLookup::Found(info) => info,
            TxLookup::Missing => {
                return Err(ProxyError::NotFound(format!("transaction {}", hash)));
            }
        };

        let snapshot = ResolvedTransaction {
            shard: sender_shard,
            info,
            result,
            calls: 1,
            degraded: false,
        };
        let receiver = snapshot.info.receiver_shard;
        if !needs_receiver_lookup(&snapshot.info) || receiver == sender_shard {
            return Ok(snapshot);
        }

        debug!(hash, sender_shard = %shard_label(sender_shard), receiver_shard = %shard_label(receiver), "Consulting receiver shard");
        let followup = self
            .dispatcher
            .send_to_shard(receiver, descriptor)
            .await
            .and_then(|result| interpret_lookup(&result).map(|lookup| (lookup, result)));

        match followup {
            Ok((TxLookup::Found(info), result)) => {
                self.dispatcher.metrics().record_followup(false);
                Ok(ResolvedTransaction {
                    shard: receiver,
                    info,
                    result,
                    calls: 2,
                    degraded: false,
                })
            }
            Ok((TxLookup::Missing, _)) => {
                self.dispatcher.metrics().record_followup(false);
                Ok(ResolvedTransaction { calls: 2, ..snapshot })
            }
            Err(err) => {
                self.dispatcher.metrics().record_followup(true);
                warn!(hash, receiver_shard = %shard_label(receiver), error = %err, "Receiver shard lookup failed, returning sender snapshot");
                Ok(ResolvedTransaction {
                    calls: 2,
                    degraded: true,
                    ..snapshot
                })
            }
        }
    }

    async fn resolve_by_fan_out(
        &self,
        hash: &str,
        descriptor: &RequestDescriptor,
    ) -> Result<ResolvedTransaction, ProxyError> {
        let descriptor = descriptor.clone().to(ShardSelector::AllShards);
        let outcome = self.dispatcher.fan_out(&descriptor).await?;
        let calls = outcome.results.len();

        let mut found: BTreeMap<ShardId, Found> = BTreeMap::new();
        let mut failed = Vec::new();
        for (shard, result) in outcome.results {
            match result.and_then(|r| interpret_lookup(&r).map(|lookup| (lookup, r))) {
                Ok((TxLookup::Found(info), result)) => {
                    found.insert(shard, (info, result));
                }
                Ok((TxLookup::Missing, _)) => {}
                Err(err) => {
                    debug!(hash, shard = %shard_label(shard), error = %err, "Shard lookup failed");
                    failed.push(shard);
                }
            }
        }

        // Lowest shard ID reporting the hash decides sender and receiver
        let Some(first) = found.keys().next().copied() else {
            if failed.is_empty() {
                return Err(ProxyError::NotFound(format!("transaction {}", hash)));
            }
            return Err(ProxyError::PartialFanOut { failed });
        };
        let (sender_shard, receiver_shard, cross_shard) = {
            let info = &found[&first].0;
            (info.sender_shard, info.receiver_shard, needs_receiver_lookup(info))
        };

        let degraded = cross_shard && failed.contains(&receiver_shard);
        if degraded {
            warn!(hash, receiver_shard = %shard_label(receiver_shard), "Receiver shard unavailable, returning sender snapshot");
        }

        let preferred = [receiver_shard, sender_shard]
            .into_iter()
            .filter(|shard| cross_shard || *shard == sender_shard)
            .find(|shard| found.contains_key(shard))
            .unwrap_or(first);

        let Some((info, result)) = found.remove(&preferred) else {
            return Err(ProxyError::NotFound(format!("transaction {}", hash)));
        };
        Ok(ResolvedTransaction {
            shard: preferred,
            info,
            result,
            calls,
            degraded,
        })
    }
}
