//! # Shard Mapping Benchmarks
//!
//! Address to shard mapping runs on every routed request:
//! - Raw computation across shard counts
//! - Cached lookups with a warm and a thrashing working set
//! - Concurrent cached lookups

use criterion::{black_box, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use shard_proxy::{AddressShardCache, ShardCoordinator};
use std::sync::Arc;
use std::time::Duration;

fn random_addresses(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let bytes: [u8; 32] = rng.gen();
            hex::encode(bytes)
        })
        .collect()
}

/// Uncached mapping for several network sizes.
pub fn bench_compute_shard_id(c: &mut Criterion) {
    let mut group = c.benchmark_group("shard-mapping-compute");
    group.measurement_time(Duration::from_secs(5));
    let addresses = random_addresses(1_000);

    for num_shards in [1u32, 3, 6, 64] {
        let coordinator = ShardCoordinator::new(num_shards).expect("valid shard count");
        group.throughput(Throughput::Elements(addresses.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_shards),
            &addresses,
            |b, addresses| {
                b.iter(|| {
                    for address in addresses {
                        black_box(coordinator.compute_shard_id(address).ok());
                    }
                })
            },
        );
    }
    group.finish();
}

/// Cached mapping: working set inside vs. far beyond the capacity.
pub fn bench_cached_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("shard-mapping-cache");
    let coordinator = ShardCoordinator::new(3).expect("valid shard count");

    for (name, working_set) in [("warm", 512usize), ("thrashing", 20_000)] {
        let cache = AddressShardCache::new(1_024);
        let addresses = random_addresses(working_set);
        group.throughput(Throughput::Elements(addresses.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| {
                for address in &addresses {
                    black_box(cache.shard_of(&coordinator, address).ok());
                }
            })
        });
    }
    group.finish();
}

/// Eight threads sharing one cache.
pub fn bench_concurrent_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("shard-mapping-concurrent");
    let coordinator = Arc::new(ShardCoordinator::new(3).expect("valid shard count"));
    let cache = Arc::new(AddressShardCache::new(4_096));
    let addresses = Arc::new(random_addresses(2_048));

    group.bench_function("8-threads", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let (coordinator, cache, addresses) =
                        (coordinator.clone(), cache.clone(), addresses.clone());
                    std::thread::spawn(move || {
                        for address in addresses.iter() {
                            black_box(cache.shard_of(&coordinator, address).ok());
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().expect("bench thread");
            }
        })
    });
    group.finish();
}
