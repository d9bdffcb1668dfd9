//! Address to shard memoization.
//!
//! The mapping is derived from the public key, so entries never expire on
//! their own. They leave only through LRU capacity pressure or an explicit
//! flush (done on every accepted topology reload).
//!
//! A hit moves the entry to the front of the recency list, so lookups take
//! the write lock for the duration of one hash lookup. Size and stats reads
//! stay on the read lock.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use lru::LruCache;
use parking_lot::RwLock;

use crate::algorithms::ShardCoordinator;
use crate::domain::{ProxyError, ShardId};

/// Cached mapping of one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    /// Computed shard
    pub shard: ShardId,
    /// When the entry was inserted
    pub inserted_at: Instant,
}

/// LRU cache in front of [`ShardCoordinator::compute_shard_id`].
pub struct AddressShardCache {
    entries: RwLock<LruCache<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AddressShardCache {
    /// Cache holding at most `capacity` addresses (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached entry, if any. A hit marks the entry as most recently used.
    pub fn get(&self, address: &str) -> Option<CacheEntry> {
        self.entries.write().get(address).copied()
    }

    /// Whether `address` is cached, without touching its recency.
    pub fn contains(&self, address: &str) -> bool {
        self.entries.read().contains(address)
    }

    /// Insert or refresh an entry.
    pub fn insert(&self, address: &str, shard: ShardId) {
        self.entries.write().put(
            address.to_string(),
            CacheEntry {
                shard,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Shard of `address`, computing and caching it on a miss.
    ///
    /// Invalid addresses are never cached.
    pub fn shard_of(
        &self,
        coordinator: &ShardCoordinator,
        address: &str,
    ) -> Result<ShardId, ProxyError> {
        if let Some(entry) = self.get(address) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.shard);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let shard = coordinator.compute_shard_id(address)?;
        self.insert(address, shard);
        Ok(shard)
    }

    /// Drop every entry.
    pub fn flush(&self) {
        self.entries.write().clear();
    }

    /// Number of cached addresses.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
