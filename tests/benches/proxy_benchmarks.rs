//! # Shard Proxy Benchmarks
//!
//! | Path | Runs | Target |
//! |------|------|--------|
//! | Address to shard | every routed request | < 1μs uncached |
//! | Cached address lookup | every routed request | < 200ns |
//! | Hyperblock merge | every hyperblock request | < 5ms for 16 shards |

use criterion::{criterion_group, criterion_main};
use proxy_tests::benchmarks::{hyperblock_merge, shard_mapping};

criterion_group!(
    benches,
    shard_mapping::bench_compute_shard_id,
    shard_mapping::bench_cached_lookup,
    shard_mapping::bench_concurrent_cache,
    hyperblock_merge::bench_build_hyperblock,
);
criterion_main!(benches);
