//! # Domain Invariants
//!
//! Rules a topology must satisfy before it may replace the active one.

use super::entities::ObserverNode;
use super::errors::{shard_label, ProxyError, ShardId, METACHAIN_SHARD_ID};
use std::collections::{BTreeSet, HashSet};

/// Minimum shard count.
pub const MIN_SHARD_COUNT: u32 = 1;

/// Maximum shard count. Keeps every regular ID far below the meta sentinel.
pub const MAX_SHARD_COUNT: u32 = 1 << 16;

/// Invariant: a shard ID is either a regular shard in range or the meta sentinel.
pub fn invariant_shard_in_range(shard: ShardId, num_shards: u32) -> bool {
    shard < num_shards || shard == METACHAIN_SHARD_ID
}

/// Invariant: every node has an in-range shard, a URL, and a unique URL.
///
/// Full-history lists only need this much; a shard without full-history
/// nodes is served by its regular ones.
pub fn invariant_nodes_well_formed(
    nodes: &[ObserverNode],
    num_shards: u32,
) -> Result<(), ProxyError> {
    let mut urls = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !invariant_shard_in_range(node.shard, num_shards) {
            return Err(ProxyError::InvalidTopology(format!(
                "observer {} has shard {} outside [0, {}) and is not meta",
                node.url, node.shard, num_shards
            )));
        }
        if node.url.trim().is_empty() {
            return Err(ProxyError::InvalidTopology(format!(
                "observer with empty url in shard {}",
                shard_label(node.shard)
            )));
        }
        if !urls.insert(node.url.as_str()) {
            return Err(ProxyError::InvalidTopology(format!(
                "duplicate observer {}",
                node.url
            )));
        }
    }
    Ok(())
}

/// Invariant: a node list covers every configured shard plus meta.
///
/// - the list is well formed (see [`invariant_nodes_well_formed`])
/// - each regular shard and the meta shard has at least one node
pub fn invariant_topology_complete(
    nodes: &[ObserverNode],
    num_shards: u32,
) -> Result<(), ProxyError> {
    if nodes.is_empty() {
        return Err(ProxyError::InvalidTopology("empty observer list".to_string()));
    }
    invariant_nodes_well_formed(nodes, num_shards)?;

    let covered: BTreeSet<ShardId> = nodes.iter().map(|node| node.shard).collect();
    let missing: Vec<String> = (0..num_shards)
        .chain(std::iter::once(METACHAIN_SHARD_ID))
        .filter(|shard| !covered.contains(shard))
        .map(shard_label)
        .collect();

    if !missing.is_empty() {
        return Err(ProxyError::InvalidTopology(format!(
            "no observers for shard(s) {}",
            missing.join(", ")
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(num_shards: u32) -> Vec<ObserverNode> {
        (0..num_shards)
            .chain(std::iter::once(METACHAIN_SHARD_ID))
            .map(|s| ObserverNode::new(format!("http://node-{}", s), s))
            .collect()
    }

    #[test]
    fn test_shard_in_range() {
        assert!(invariant_shard_in_range(0, 3));
        assert!(invariant_shard_in_range(2, 3));
        assert!(!invariant_shard_in_range(3, 3));
        assert!(invariant_shard_in_range(METACHAIN_SHARD_ID, 3));
    }

    #[test]
    fn test_complete_topology_accepted() {
        assert!(invariant_topology_complete(&full(3), 3).is_ok());
    }

    #[test]
    fn test_missing_shard_rejected() {
        let mut nodes = full(3);
        nodes.retain(|n| n.shard != 1);

        let err = invariant_topology_complete(&nodes, 3).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidTopology(ref m) if m.contains("1")));
    }

    #[test]
    fn test_missing_meta_rejected() {
        let mut nodes = full(2);
        nodes.retain(|n| n.shard != METACHAIN_SHARD_ID);

        let err = invariant_topology_complete(&nodes, 2).unwrap_err();
        assert!(err.to_string().contains("meta"));
    }

    #[test]
    fn test_out_of_range_shard_rejected() {
        let mut nodes = full(2);
        nodes.push(ObserverNode::new("http://stray", 7));
        assert!(invariant_topology_complete(&nodes, 2).is_err());
    }

    #[test]
    fn test_duplicate_url_rejected() {
        let mut nodes = full(2);
        nodes.push(ObserverNode::new("http://node-0", 1));
        let err = invariant_topology_complete(&nodes, 2).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_partial_list_is_well_formed() {
        let nodes = vec![ObserverNode::new("http://hist-0", 0)];
        assert!(invariant_nodes_well_formed(&nodes, 3).is_ok());
        assert!(invariant_nodes_well_formed(&[], 3).is_ok());
        assert!(invariant_topology_complete(&nodes, 3).is_err());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(invariant_topology_complete(&[], 1).is_err());
    }
}
