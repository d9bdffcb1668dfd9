//! # Hyperblock Merge Benchmarks
//!
//! Merging is pure CPU once every block has arrived; measured with
//! growing shard counts and transaction volumes.

use criterion::{black_box, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use shard_proxy::domain::{ApiBlock, MiniBlock, NotarizedShardBlockRef};
use shard_proxy::{build_hyperblock, HyperblockMode, ShardId, METACHAIN_SHARD_ID};

fn block(shard: ShardId, num_shards: u32, txs_per_miniblock: usize) -> ApiBlock {
    let mini_blocks = (0..num_shards)
        .map(|destination| MiniBlock {
            hash: format!("mb-{}-{}", shard, destination),
            kind: "TxBlock".to_string(),
            source_shard: shard,
            destination_shard: destination,
            transactions: (0..txs_per_miniblock)
                .map(|i| json!({"hash": format!("{}-{}-{}", shard, destination, i), "value": "1"}))
                .collect(),
        })
        .collect();
    ApiBlock {
        nonce: 100,
        shard,
        hash: format!("blk-{}", shard),
        mini_blocks,
        ..ApiBlock::default()
    }
}

/// Merge one meta block with `num_shards` shard blocks.
pub fn bench_build_hyperblock(c: &mut Criterion) {
    let mut group = c.benchmark_group("hyperblock-merge");

    for (num_shards, txs) in [(3u32, 10usize), (3, 500), (16, 100)] {
        let shard_blocks: Vec<ApiBlock> =
            (0..num_shards).map(|s| block(s, num_shards, txs)).collect();
        let meta = ApiBlock {
            nonce: 7,
            shard: METACHAIN_SHARD_ID,
            hash: "meta".to_string(),
            notarized_blocks: shard_blocks
                .iter()
                .map(|b| NotarizedShardBlockRef {
                    hash: b.hash.clone(),
                    nonce: b.nonce,
                    round: 0,
                    shard: b.shard,
                })
                .collect(),
            ..ApiBlock::default()
        };

        let total = (num_shards as usize * num_shards as usize * txs) as u64;
        group.throughput(Throughput::Elements(total));
        for mode in [HyperblockMode::Finalized, HyperblockMode::NotarizedAtSource] {
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", mode), format!("{}x{}", num_shards, txs)),
                &shard_blocks,
                |b, blocks| b.iter(|| black_box(build_hyperblock(&meta, blocks, mode))),
            );
        }
    }
    group.finish();
}
