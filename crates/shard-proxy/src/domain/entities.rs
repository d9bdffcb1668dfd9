//! # Domain Entities
//!
//! Observer nodes, the topology they form, and the typed views of backend
//! block/transaction payloads that the core has to look inside.
//!
//! Everything the core only forwards stays an opaque `serde_json::Value`.

use super::errors::{ShardId, METACHAIN_SHARD_ID};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Role of an observer node.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    /// Regular observer (recent state only).
    #[default]
    Regular,
    /// Full-history observer (retains pruned data).
    FullHistory,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Regular => write!(f, "regular"),
            NodeRole::FullHistory => write!(f, "full-history"),
        }
    }
}

/// A backend node the proxy can query. Identity is the URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverNode {
    /// Base URL, e.g. `http://10.0.0.1:8080`
    pub url: String,
    /// Shard the node belongs to
    pub shard: ShardId,
    /// Node role
    #[serde(default)]
    pub role: NodeRole,
    /// Fallback nodes are tried only after every primary node of the pool
    #[serde(default)]
    pub fallback: bool,
}

impl ObserverNode {
    /// Create a primary regular observer.
    pub fn new(url: impl Into<String>, shard: ShardId) -> Self {
        Self {
            url: url.into(),
            shard,
            role: NodeRole::Regular,
            fallback: false,
        }
    }

    /// Set the role.
    pub fn with_role(mut self, role: NodeRole) -> Self {
        self.role = role;
        self
    }

    /// Mark as fallback node.
    pub fn as_fallback(mut self) -> Self {
        self.fallback = true;
        self
    }
}

/// Immutable node list of the whole network, per role and shard.
///
/// Order inside a shard is the configured order; it seeds the rotation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    regular: BTreeMap<ShardId, Vec<ObserverNode>>,
    full_history: BTreeMap<ShardId, Vec<ObserverNode>>,
}

impl Topology {
    /// Build a topology from a flat node list.
    pub fn from_nodes(nodes: impl IntoIterator<Item = ObserverNode>) -> Self {
        let mut topology = Self::default();
        for node in nodes {
            topology.role_map_mut(node.role).entry(node.shard).or_default().push(node);
        }
        topology
    }

    /// Copy of this topology where every node of `role` is replaced by `nodes`.
    ///
    /// Nodes are re-tagged with `role`.
    pub fn with_role(&self, role: NodeRole, nodes: Vec<ObserverNode>) -> Self {
        let mut next = self.clone();
        let map = next.role_map_mut(role);
        map.clear();
        for node in nodes {
            let node = node.with_role(role);
            map.entry(node.shard).or_default().push(node);
        }
        next
    }

    /// Nodes of one shard for a role, in configured order.
    pub fn nodes(&self, role: NodeRole, shard: ShardId) -> &[ObserverNode] {
        self.role_map(role)
            .get(&shard)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Shards that have at least one node for a role.
    pub fn shards(&self, role: NodeRole) -> impl Iterator<Item = ShardId> + '_ {
        self.role_map(role).keys().copied()
    }

    /// Every node of a role, shard by shard.
    pub fn all(&self, role: NodeRole) -> Vec<ObserverNode> {
        self.role_map(role).values().flatten().cloned().collect()
    }

    /// Total node count across both roles.
    pub fn len(&self) -> usize {
        self.regular.values().map(Vec::len).sum::<usize>()
            + self.full_history.values().map(Vec::len).sum::<usize>()
    }

    /// True when no node is known.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn role_map(&self, role: NodeRole) -> &BTreeMap<ShardId, Vec<ObserverNode>> {
        match role {
            NodeRole::Regular => &self.regular,
            NodeRole::FullHistory => &self.full_history,
        }
    }

    fn role_map_mut(&mut self, role: NodeRole) -> &mut BTreeMap<ShardId, Vec<ObserverNode>> {
        match role {
            NodeRole::Regular => &mut self.regular,
            NodeRole::FullHistory => &mut self.full_history,
        }
    }
}

// =============================================================================
// Backend payload views
// =============================================================================

/// Reference from a meta block to a shard block it notarized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotarizedShardBlockRef {
    /// Shard block hash
    pub hash: String,
    /// Shard block nonce
    pub nonce: u64,
    /// Shard block round
    pub round: u64,
    /// Originating shard
    pub shard: ShardId,
}

/// Miniblock inside a block, with its transactions kept opaque.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MiniBlock {
    /// Miniblock hash
    pub hash: String,
    /// Miniblock type (`TxBlock`, `SmartContractResultBlock`, `PeerBlock`, ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// Source shard
    pub source_shard: ShardId,
    /// Destination shard
    pub destination_shard: ShardId,
    /// Transactions
    pub transactions: Vec<Value>,
}

/// Miniblock type that never contributes transactions to a hyperblock.
pub const PEER_MINIBLOCK_TYPE: &str = "PeerBlock";

/// Block as returned by an observer's block endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiBlock {
    /// Nonce
    pub nonce: u64,
    /// Round
    pub round: u64,
    /// Epoch
    pub epoch: u32,
    /// Shard
    pub shard: ShardId,
    /// Block hash
    pub hash: String,
    /// Previous block hash
    pub prev_block_hash: String,
    /// State root hash
    pub state_root_hash: String,
    /// Unix timestamp
    pub timestamp: i64,
    /// Block status (`on-chain`, `reverted`)
    pub status: String,
    /// Accumulated fees
    pub accumulated_fees: String,
    /// Developer fees
    pub developer_fees: String,
    /// Transaction count
    pub num_txs: u32,
    /// Shard blocks notarized by this block (meta blocks only)
    pub notarized_blocks: Vec<NotarizedShardBlockRef>,
    /// Miniblocks
    pub mini_blocks: Vec<MiniBlock>,
}

impl ApiBlock {
    /// Whether this is a meta-shard block.
    pub fn is_meta(&self) -> bool {
        self.shard == METACHAIN_SHARD_ID
    }
}

/// Transaction tagged with the shard it was collected from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HyperblockTransaction {
    /// Originating shard
    pub shard: ShardId,
    /// Transaction payload as returned by the observer
    pub transaction: Value,
}

/// Aggregate view of one meta block plus every shard block it notarized.
///
/// Built fresh per request; never cached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hyperblock {
    /// Meta block nonce
    pub nonce: u64,
    /// Meta block round
    pub round: u64,
    /// Epoch
    pub epoch: u32,
    /// Meta block hash
    pub hash: String,
    /// Previous meta block hash
    pub prev_block_hash: String,
    /// Meta state root hash
    pub state_root_hash: String,
    /// Unix timestamp
    pub timestamp: i64,
    /// Meta block status
    pub status: String,
    /// Accumulated fees
    pub accumulated_fees: String,
    /// Developer fees
    pub developer_fees: String,
    /// Notarized shard blocks, in meta block order
    pub shard_blocks: Vec<NotarizedShardBlockRef>,
    /// Transaction count
    pub num_txs: u32,
    /// Transactions tagged by originating shard
    pub transactions: Vec<HyperblockTransaction>,
}

impl Hyperblock {
    /// Distinct shards contributing transactions.
    pub fn transaction_shards(&self) -> Vec<ShardId> {
        let mut shards: Vec<ShardId> = self.transactions.iter().map(|tx| tx.shard).collect();
        shards.sort_unstable();
        shards.dedup();
        shards
    }
}

/// Fields of a transaction payload needed for cross-shard resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionInfo {
    /// Transaction hash
    pub hash: String,
    /// Sender address
    pub sender: String,
    /// Receiver address
    pub receiver: String,
    /// Sender shard
    #[serde(rename = "sourceShard")]
    pub sender_shard: ShardId,
    /// Receiver shard
    #[serde(rename = "destinationShard")]
    pub receiver_shard: ShardId,
    /// Status (`pending`, `success`, `fail`, `invalid`, ...)
    pub status: String,
}

impl TransactionInfo {
    /// Whether sender and receiver live in different shards.
    pub fn is_cross_shard(&self) -> bool {
        self.sender_shard != self.receiver_shard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_groups_by_role_and_shard() {
        let topology = Topology::from_nodes(vec![
            ObserverNode::new("http://a", 0),
            ObserverNode::new("http://b", 0),
            ObserverNode::new("http://c", 1),
            ObserverNode::new("http://h", 0).with_role(NodeRole::FullHistory),
        ]);

        assert_eq!(topology.nodes(NodeRole::Regular, 0).len(), 2);
        assert_eq!(topology.nodes(NodeRole::Regular, 1).len(), 1);
        assert_eq!(topology.nodes(NodeRole::FullHistory, 0).len(), 1);
        assert!(topology.nodes(NodeRole::FullHistory, 1).is_empty());
        assert_eq!(topology.len(), 4);
    }

    #[test]
    fn test_with_role_replaces_only_that_role() {
        let topology = Topology::from_nodes(vec![
            ObserverNode::new("http://a", 0),
            ObserverNode::new("http://h", 0).with_role(NodeRole::FullHistory),
        ]);

        let next = topology.with_role(
            NodeRole::FullHistory,
            vec![ObserverNode::new("http://h2", 1)],
        );

        assert_eq!(next.nodes(NodeRole::Regular, 0)[0].url, "http://a");
        assert!(next.nodes(NodeRole::FullHistory, 0).is_empty());
        let h2 = &next.nodes(NodeRole::FullHistory, 1)[0];
        assert_eq!(h2.role, NodeRole::FullHistory);
        // Original untouched
        assert_eq!(topology.nodes(NodeRole::FullHistory, 0).len(), 1);
    }

    #[test]
    fn test_api_block_parses_camel_case() {
        let json = serde_json::json!({
            "nonce": 10,
            "shard": 4294967295u32,
            "hash": "aa",
            "notarizedBlocks": [{"hash": "bb", "nonce": 9, "round": 9, "shard": 1}],
            "miniBlocks": [{"type": "TxBlock", "sourceShard": 1, "destinationShard": 2, "transactions": [{"hash": "t1"}]}]
        });

        let block: ApiBlock = serde_json::from_value(json).unwrap();
        assert!(block.is_meta());
        assert_eq!(block.notarized_blocks[0].shard, 1);
        assert_eq!(block.mini_blocks[0].kind, "TxBlock");
        assert_eq!(block.mini_blocks[0].destination_shard, 2);
    }

    #[test]
    fn test_transaction_info_cross_shard() {
        let json = serde_json::json!({
            "hash": "t1",
            "sourceShard": 2,
            "destinationShard": 5,
            "status": "pending"
        });
        let info: TransactionInfo = serde_json::from_value(json).unwrap();
        assert!(info.is_cross_shard());
        assert_eq!(info.receiver_shard, 5);
    }

    #[test]
    fn test_node_role_display() {
        assert_eq!(NodeRole::Regular.to_string(), "regular");
        assert_eq!(NodeRole::FullHistory.to_string(), "full-history");
    }
}
