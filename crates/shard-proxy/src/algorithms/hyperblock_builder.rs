//! # Hyperblock Builder
//!
//! Pure merge of one meta block and the shard blocks it notarized.
//!
//! Output order follows the input order (the meta block's notarized list),
//! never the order in which shard calls completed.

use crate::domain::{
    ApiBlock, Hyperblock, HyperblockMode, HyperblockTransaction, NotarizedShardBlockRef,
    PEER_MINIBLOCK_TYPE,
};

/// Merge a meta block with its notarized shard blocks.
///
/// `shard_blocks` must be ordered like `meta.notarized_blocks`.
pub fn build_hyperblock(
    meta: &ApiBlock,
    shard_blocks: &[ApiBlock],
    mode: HyperblockMode,
) -> Hyperblock {
    let mut transactions = collect_transactions(meta, mode);
    for block in shard_blocks {
        transactions.extend(collect_transactions(block, mode));
    }

    let shard_blocks = shard_blocks
        .iter()
        .map(|block| NotarizedShardBlockRef {
            hash: block.hash.clone(),
            nonce: block.nonce,
            round: block.round,
            shard: block.shard,
        })
        .collect();

    Hyperblock {
        nonce: meta.nonce,
        round: meta.round,
        epoch: meta.epoch,
        hash: meta.hash.clone(),
        prev_block_hash: meta.prev_block_hash.clone(),
        state_root_hash: meta.state_root_hash.clone(),
        timestamp: meta.timestamp,
        status: meta.status.clone(),
        accumulated_fees: meta.accumulated_fees.clone(),
        developer_fees: meta.developer_fees.clone(),
        shard_blocks,
        num_txs: transactions.len() as u32,
        transactions,
    }
}

/// Transactions of one block that belong in a hyperblock, tagged with the block's shard.
///
/// Peer miniblocks never count. Finalized mode keeps miniblocks executed in
/// this shard as destination; notarized-at-source mode keeps miniblocks
/// originating in this shard.
pub fn collect_transactions(block: &ApiBlock, mode: HyperblockMode) -> Vec<HyperblockTransaction> {
    block
        .mini_blocks
        .iter()
        .filter(|mb| mb.kind != PEER_MINIBLOCK_TYPE)
        .filter(|mb| match mode {
            HyperblockMode::Finalized => mb.destination_shard == block.shard,
            HyperblockMode::NotarizedAtSource => mb.source_shard == block.shard,
        })
        .flat_map(|mb| mb.transactions.iter())
        .map(|tx| HyperblockTransaction {
            shard: block.shard,
            transaction: tx.clone(),
        })
        .collect()
}

/// Check that a fetched shard block is the one the meta block referenced.
pub fn check_notarized_match(
    reference: &NotarizedShardBlockRef,
    block: &ApiBlock,
) -> Result<(), String> {
    if block.shard != reference.shard {
        return Err(format!(
            "expected block of shard {}, got shard {}",
            reference.shard, block.shard
        ));
    }
    if !reference.hash.is_empty() && block.hash != reference.hash {
        return Err(format!(
            "expected block hash {}, got {}",
            reference.hash, block.hash
        ));
    }
    if block.nonce != reference.nonce {
        return Err(format!(
            "expected block nonce {}, got {}",
            reference.nonce, block.nonce
        ));
    }
    Ok(())
}
