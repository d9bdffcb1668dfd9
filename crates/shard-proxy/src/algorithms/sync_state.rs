//! # Node Sync State
//!
//! Reads the `/node/status` metrics of an observer and decides whether it
//! is caught up with its shard.
//!
//! A node is synced when:
//! - its nonce is within `threshold` blocks of the probable highest nonce
//!   (or ahead of it, since the nonce metric updates first), and
//! - it reports VM queries as ready.

use serde::Deserialize;
use serde_json::Value;

/// Observer path of the node status endpoint.
pub const NODE_STATUS_PATH: &str = "/node/status";

/// The status metrics the sync decision needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct NodeSyncMetrics {
    /// Last committed block nonce
    #[serde(rename = "erd_nonce", default)]
    pub nonce: u64,
    /// Highest nonce the node has heard of
    #[serde(rename = "erd_probable_highest_nonce", default)]
    pub probable_highest_nonce: u64,
    /// VM queries can be served
    #[serde(
        rename = "erd_are_vm_queries_ready",
        default,
        deserialize_with = "flag"
    )]
    pub vm_queries_ready: bool,
}

impl NodeSyncMetrics {
    /// Blocks the node is behind (zero when it is ahead).
    pub fn lag(&self) -> u64 {
        self.probable_highest_nonce.saturating_sub(self.nonce)
    }

    /// Whether the node counts as synced for `threshold`.
    pub fn is_synced(&self, threshold: u64) -> bool {
        self.lag() < threshold && self.vm_queries_ready
    }
}

/// Nodes report the VM flag either as a JSON bool or as `"true"`/`"false"`.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::String(s) => Ok(s.trim().eq_ignore_ascii_case("true")),
        _ => Ok(false),
    }
}

/// Parse a `/node/status` answer (`{ data: { metrics: {..} }, .. }`).
pub fn parse_node_status(status: u16, body: &str) -> Result<NodeSyncMetrics, String> {
    if status != 200 {
        return Err(format!("node status answered {}", status));
    }
    let body: Value = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let metrics = body
        .pointer("/data/metrics")
        .cloned()
        .ok_or_else(|| "missing data.metrics".to_string())?;
    serde_json::from_value(metrics).map_err(|e| e.to_string())
}
