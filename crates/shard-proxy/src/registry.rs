//! # Observer Registry
//!
//! Per-shard observer pools with rotation.
//!
//! ## Concurrency
//!
//! - The whole topology lives behind one `RwLock<Arc<Snapshot>>`. Readers hold
//!   the lock only long enough to clone the `Arc`; `replace_all` swaps the
//!   pointer, so a reader sees either the old or the new topology, never a mix.
//! - Each pool's rotation cursor is an `AtomicUsize` inside the snapshot. A
//!   selection is one `fetch_add`; nothing is held across a network call.
//! - Nodes are never removed by failures. `rotate_on_failure` only moves the
//!   cursor; the node stays eligible and is tried again once it comes around.
//!
//! ## Sync State
//!
//! Observers reported out of sync (see `sync_checker`) are demoted, not
//! removed. Candidate order is:
//!
//! ```text
//! synced primaries (rotated) -> synced fallbacks -> lagging primaries (rotated) -> lagging fallbacks
//! ```
//!
//! The out-of-sync set is keyed by URL and survives topology swaps for the
//! nodes that remain configured.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::domain::{shard_label, NodeRole, ObserverNode, ProxyError, ShardId, Topology};

/// Ordered candidates for one shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Nodes to try, in order
    pub nodes: Vec<ObserverNode>,
    /// Role the nodes actually have
    pub role: NodeRole,
    /// Full-history was requested but regular nodes were returned
    pub used_role_fallback: bool,
}

/// Nodes of one (role, shard) plus its rotation cursor.
#[derive(Debug)]
struct ShardObserverPool {
    primaries: Vec<ObserverNode>,
    fallbacks: Vec<ObserverNode>,
    cursor: AtomicUsize,
}

impl ShardObserverPool {
    fn new(nodes: &[ObserverNode]) -> Self {
        let (fallbacks, primaries): (Vec<_>, Vec<_>) =
            nodes.iter().cloned().partition(|node| node.fallback);
        Self {
            primaries,
            fallbacks,
            cursor: AtomicUsize::new(0),
        }
    }

    fn configured_order(&self) -> Vec<ObserverNode> {
        self.primaries
            .iter()
            .chain(self.fallbacks.iter())
            .cloned()
            .collect()
    }

    /// Candidate order for one request (cursor advanced once).
    fn rotated(&self, unsynced: &HashSet<String>) -> Vec<ObserverNode> {
        let (live, lagging) = split_by_sync(&self.primaries, unsynced);
        let (live_fallbacks, lagging_fallbacks) = split_by_sync(&self.fallbacks, unsynced);
        let cursor = self.cursor.fetch_add(1, Ordering::Relaxed);

        let mut nodes = Vec::with_capacity(self.primaries.len() + self.fallbacks.len());
        extend_rotated(&mut nodes, &live, cursor);
        nodes.extend(live_fallbacks.into_iter().cloned());
        extend_rotated(&mut nodes, &lagging, cursor);
        nodes.extend(lagging_fallbacks.into_iter().cloned());
        nodes
    }

    /// Move the cursor past `failed` if the next selection would start on it.
    fn skip(&self, failed: &ObserverNode, unsynced: &HashSet<String>) -> bool {
        let (live, lagging) = split_by_sync(&self.primaries, unsynced);
        let lane = if unsynced.contains(&failed.url) {
            lagging
        } else {
            live
        };
        let len = lane.len();
        if len < 2 {
            return false;
        }
        let Some(index) = lane.iter().position(|n| n.url == failed.url) else {
            return false;
        };

        self.cursor
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cursor| {
                (cursor % len == index).then_some(cursor.wrapping_add(1))
            })
            .is_ok()
    }
}

/// (synced, out of sync), each in configured order.
fn split_by_sync<'a>(
    nodes: &'a [ObserverNode],
    unsynced: &HashSet<String>,
) -> (Vec<&'a ObserverNode>, Vec<&'a ObserverNode>) {
    nodes.iter().partition(|node| !unsynced.contains(&node.url))
}

fn extend_rotated(out: &mut Vec<ObserverNode>, lane: &[&ObserverNode], cursor: usize) {
    if lane.is_empty() {
        return;
    }
    let start = cursor % lane.len();
    out.extend(lane[start..].iter().map(|node| (*node).clone()));
    out.extend(lane[..start].iter().map(|node| (*node).clone()));
}

#[derive(Debug, Default)]
struct Snapshot {
    topology: Arc<Topology>,
    pools: HashMap<(NodeRole, ShardId), ShardObserverPool>,
    generation: u64,
}

impl Snapshot {
    fn build(topology: Topology, generation: u64) -> Self {
        let mut pools = HashMap::new();
        for role in [NodeRole::Regular, NodeRole::FullHistory] {
            for shard in topology.shards(role) {
                pools.insert((role, shard), ShardObserverPool::new(topology.nodes(role, shard)));
            }
        }
        Self {
            topology: Arc::new(topology),
            pools,
            generation,
        }
    }

    fn pool(
        &self,
        shard: ShardId,
        role: NodeRole,
        allow_role_fallback: bool,
    ) -> Result<(&ShardObserverPool, NodeRole, bool), ProxyError> {
        if let Some(pool) = self.pools.get(&(role, shard)) {
            return Ok((pool, role, false));
        }
        if role == NodeRole::FullHistory && allow_role_fallback {
            if let Some(pool) = self.pools.get(&(NodeRole::Regular, shard)) {
                return Ok((pool, NodeRole::Regular, true));
            }
        }
        Err(ProxyError::NoObservers(shard))
    }
}

/// Process-wide observer topology, passed around by handle.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    current: RwLock<Arc<Snapshot>>,
    rotations: AtomicU64,
    unsynced: RwLock<HashSet<String>>,
    sync_check: Notify,
}

impl ObserverRegistry {
    /// Registry serving `topology`.
    pub fn new(topology: Topology) -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::build(topology, 0))),
            rotations: AtomicU64::new(0),
            unsynced: RwLock::new(HashSet::new()),
            sync_check: Notify::new(),
        }
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Pool of a shard in configured order (no cursor movement).
    ///
    /// With `role = FullHistory` and no full-history node for the shard,
    /// regular nodes are returned and `used_role_fallback` is set, unless
    /// `allow_role_fallback` is false.
    pub fn observers(
        &self,
        shard: ShardId,
        role: NodeRole,
        allow_role_fallback: bool,
    ) -> Result<Selection, ProxyError> {
        let snapshot = self.snapshot();
        let (pool, role, used_role_fallback) = snapshot.pool(shard, role, allow_role_fallback)?;
        Ok(Selection {
            nodes: pool.configured_order(),
            role,
            used_role_fallback,
        })
    }

    /// Candidates for one request: synced primaries in rotation order starting
    /// at the cursor, then synced fallbacks, then the out-of-sync nodes in the
    /// same order. Advances the cursor by one.
    pub fn candidates(
        &self,
        shard: ShardId,
        role: NodeRole,
        allow_role_fallback: bool,
    ) -> Result<Selection, ProxyError> {
        let snapshot = self.snapshot();
        let (pool, role, used_role_fallback) = snapshot.pool(shard, role, allow_role_fallback)?;
        let nodes = pool.rotated(&self.unsynced.read());
        if used_role_fallback {
            debug!(shard = %shard_label(shard), "No full-history observers, using regular ones");
        }
        Ok(Selection {
            nodes,
            role,
            used_role_fallback,
        })
    }

    /// Record a node failure: the next selection for the pool will not start
    /// on `failed`. The node is not removed.
    pub fn rotate_on_failure(&self, shard: ShardId, role: NodeRole, failed: &ObserverNode) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.snapshot();
        if let Some(pool) = snapshot.pools.get(&(role, shard)) {
            if pool.skip(failed, &self.unsynced.read()) {
                debug!(shard = %shard_label(shard), %role, observer = %failed.url, "Rotated past failed observer");
            }
        }
    }

    /// Atomically replace the whole topology. Cursors restart at zero.
    pub fn replace_all(&self, topology: Topology) {
        let mut current = self.current.write();
        let generation = current.generation + 1;
        let nodes = topology.len();
        let configured: HashSet<String> = [NodeRole::Regular, NodeRole::FullHistory]
            .into_iter()
            .flat_map(|role| topology.all(role))
            .map(|node| node.url)
            .collect();
        *current = Arc::new(Snapshot::build(topology, generation));
        drop(current);
        self.unsynced.write().retain(|url| configured.contains(url));
        info!(generation, nodes, "Observer topology replaced");
    }

    /// Record the outcome of a sync check, one `(url, synced)` per node.
    ///
    /// Nodes not listed keep their state. Returns the number of nodes now
    /// out of sync.
    pub fn apply_sync_states(&self, states: &[(String, bool)]) -> usize {
        let mut unsynced = self.unsynced.write();
        for (url, synced) in states {
            if *synced {
                if unsynced.remove(url) {
                    info!(observer = %url, "Observer back in sync, restored to rotation");
                }
            } else if unsynced.insert(url.clone()) {
                warn!(observer = %url, "Observer out of sync, demoted behind synced nodes");
            }
        }
        unsynced.len()
    }

    /// Whether `url` is currently considered synced.
    pub fn is_synced(&self, url: &str) -> bool {
        !self.unsynced.read().contains(url)
    }

    /// URLs of out-of-sync observers, sorted.
    pub fn out_of_sync(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.unsynced.read().iter().cloned().collect();
        urls.sort();
        urls
    }

    /// Ask the sync checker to run before its next tick. Requests made while
    /// a check is running coalesce into one.
    pub fn request_sync_check(&self) {
        self.sync_check.notify_one();
    }

    /// Completes when a sync check has been requested.
    pub async fn sync_check_requested(&self) {
        self.sync_check.notified().await;
    }

    /// Current topology.
    pub fn topology(&self) -> Arc<Topology> {
        self.snapshot().topology.clone()
    }

    /// Number of completed `replace_all` calls.
    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// Number of `rotate_on_failure` calls since creation.
    pub fn rotation_count(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    /// Shards that have at least one node of `role`.
    pub fn shard_ids(&self, role: NodeRole) -> Vec<ShardId> {
        self.snapshot().topology.shards(role).collect()
    }

    /// Every node of a role.
    pub fn all_observers(&self, role: NodeRole) -> Vec<ObserverNode> {
        self.snapshot().topology.all(role)
    }
}
