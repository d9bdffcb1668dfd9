//! # Hyperblock Assembler
//!
//! One meta block plus every shard block it notarized, fetched concurrently
//! and merged. All-or-nothing: any shard failure fails the whole assembly.

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::algorithms::{build_hyperblock, check_notarized_match};
use crate::domain::{
    shard_label, ApiBlock, BlockQuery, DispatchResult, Hyperblock, HyperblockMode,
    NotarizedShardBlockRef, ProxyError, RequestDescriptor, ShardSelector, METACHAIN_SHARD_ID,
};
use crate::dispatcher::Dispatcher;

/// Assembles hyperblocks from the meta shard and the shards it notarized.
#[derive(Clone)]
pub struct HyperblockAssembler {
    dispatcher: Dispatcher,
    mode: HyperblockMode,
}

impl HyperblockAssembler {
    /// Create an assembler.
    pub fn new(dispatcher: Dispatcher, mode: HyperblockMode) -> Self {
        Self { dispatcher, mode }
    }

    /// Transaction selection mode.
    pub fn mode(&self) -> HyperblockMode {
        self.mode
    }

    /// Hyperblock of the meta block with this nonce.
    pub async fn by_nonce(&self, nonce: u64) -> Result<Hyperblock, ProxyError> {
        self.assemble(BlockQuery::Nonce(nonce)).await
    }

    /// Hyperblock of the meta block with this hash.
    pub async fn by_hash(&self, hash: &str) -> Result<Hyperblock, ProxyError> {
        self.assemble(BlockQuery::Hash(hash.to_string())).await
    }

    async fn assemble(&self, query: BlockQuery) -> Result<Hyperblock, ProxyError> {
        let descriptor = RequestDescriptor::get(query.path(true))
            .to(ShardSelector::Meta)
            .full_history();
        let result = self.dispatcher.send(&descriptor).await?;
        let meta = parse_block(&result, || format!("hyperblock {}", query))?;

        debug!(
            request_id = %descriptor.id,
            nonce = meta.nonce,
            notarized = meta.notarized_blocks.len(),
            "Fetched meta block"
        );

        let outcome = self.fetch_shard_blocks(&meta.notarized_blocks).await;
        self.dispatcher.metrics().record_hyperblock(outcome.is_ok());
        let shard_blocks = outcome?;

        let hyperblock = build_hyperblock(&meta, &shard_blocks, self.mode);
        info!(
            nonce = hyperblock.nonce,
            shard_blocks = hyperblock.shard_blocks.len(),
            txs = hyperblock.num_txs,
            "Assembled hyperblock"
        );
        Ok(hyperblock)
    }

    /// Fetch every referenced block concurrently, returned in reference order.
    async fn fetch_shard_blocks(
        &self,
        references: &[NotarizedShardBlockRef],
    ) -> Result<Vec<ApiBlock>, ProxyError> {
        let mut tasks = JoinSet::new();
        for (index, reference) in references.iter().cloned().enumerate() {
            let dispatcher = self.dispatcher.clone();
            tasks.spawn(async move {
                let block = fetch_shard_block(&dispatcher, &reference).await;
                (index, reference.shard, block)
            });
        }

        let mut blocks: Vec<Option<ApiBlock>> = vec![None; references.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, shard, block) = joined.map_err(|err| ProxyError::IncompleteHyperblock {
                shard: METACHAIN_SHARD_ID,
                reason: format!("shard task aborted: {}", err),
            })?;
            match block {
                Ok(block) => blocks[index] = Some(block),
                Err(reason) => {
                    warn!(shard = %shard_label(shard), %reason, "Hyperblock shard fetch failed");
                    // Dropping `tasks` aborts the remaining shard calls
                    return Err(ProxyError::IncompleteHyperblock { shard, reason });
                }
            }
        }

        blocks
            .into_iter()
            .zip(references)
            .map(|(block, reference)| {
                block.ok_or_else(|| ProxyError::IncompleteHyperblock {
                    shard: reference.shard,
                    reason: "no answer".to_string(),
                })
            })
            .collect()
    }
}

async fn fetch_shard_block(
    dispatcher: &Dispatcher,
    reference: &NotarizedShardBlockRef,
) -> Result<ApiBlock, String> {
    let query = if reference.hash.is_empty() {
        BlockQuery::Nonce(reference.nonce)
    } else {
        BlockQuery::Hash(reference.hash.clone())
    };
    let descriptor = RequestDescriptor::get(query.path(true)).full_history();

    let result = dispatcher
        .send_to_shard(reference.shard, &descriptor)
        .await
        .map_err(|err| err.to_string())?;
    let block = parse_block(&result, || format!("block {}", query)).map_err(|err| err.to_string())?;
    check_notarized_match(reference, &block)?;
    Ok(block)
}

/// `data.block` of a block endpoint answer.
fn parse_block(
    result: &DispatchResult,
    what: impl FnOnce() -> String,
) -> Result<ApiBlock, ProxyError> {
    if result.status == 404 {
        return Err(ProxyError::NotFound(what()));
    }
    if !result.is_success() {
        let error = result
            .envelope()
            .map(|env| env.error)
            .unwrap_or_default();
        return Err(ProxyError::InvalidRequest(format!(
            "{}: status {} {}",
            what(),
            result.status,
            error
        )));
    }
    result.data_field("block")
}
