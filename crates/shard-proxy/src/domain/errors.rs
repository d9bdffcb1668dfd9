//! # Domain Errors
//!
//! Error taxonomy for the routing, dispatch and aggregation core.
//!
//! Every failure here is scoped to a single request. Nothing in this enum is
//! fatal to the process: the proxy keeps serving other requests and keeps the
//! last known good topology.

use std::time::Duration;
use thiserror::Error;

/// Shard identifier. Regular shards live in `[0, num_shards)`.
pub type ShardId = u32;

/// Sentinel shard ID of the coordinating (meta) shard.
///
/// Never inside the regular range for any supported shard count.
pub const METACHAIN_SHARD_ID: ShardId = u32::MAX;

/// Length of a decoded account address (raw public key bytes).
pub const ADDRESS_LEN: usize = 32;

/// Proxy error types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProxyError {
    /// Address could not be decoded (wrong length or encoding).
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Every node of a shard failed at node level.
    #[error("Shard {shard} unreachable after {attempts} attempts")]
    ShardUnreachable {
        /// Shard that was exhausted
        shard: ShardId,
        /// Attempts performed before giving up
        attempts: usize,
    },

    /// Valid absence (no shard knows the item).
    #[error("Not found: {0}")]
    NotFound(String),

    /// One of the shard calls of a hyperblock assembly failed.
    #[error("Incomplete hyperblock: shard {shard}: {reason}")]
    IncompleteHyperblock {
        /// Shard whose block could not be fetched
        shard: ShardId,
        /// Underlying failure
        reason: String,
    },

    /// Topology reload rejected; the previous topology stays active.
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// Overall request deadline exceeded.
    #[error("Gateway timeout after {0:?}")]
    GatewayTimeout(Duration),

    /// Shard ID outside the configured range.
    #[error("Unknown shard: {0}")]
    UnknownShard(ShardId),

    /// Registry has no node at all for the shard.
    #[error("No observers for shard {0}")]
    NoObservers(ShardId),

    /// Descriptor cannot be dispatched as requested.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Backend answered with a payload the core had to inspect but could not parse.
    #[error("Malformed response from {observer}: {reason}")]
    MalformedResponse {
        /// Observer URL
        observer: String,
        /// Parse failure
        reason: String,
    },

    /// All-or-nothing fan-out where some shards failed.
    #[error("Fan-out failed for shards {failed:?}")]
    PartialFanOut {
        /// Shards that failed
        failed: Vec<ShardId>,
    },
}

impl ProxyError {
    /// Whether the caller may retry the whole request and expect a different outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProxyError::ShardUnreachable { .. }
                | ProxyError::IncompleteHyperblock { .. }
                | ProxyError::GatewayTimeout(_)
                | ProxyError::PartialFanOut { .. }
                | ProxyError::NoObservers(_)
        )
    }

    /// HTTP status an outer HTTP layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            ProxyError::InvalidAddress(_)
            | ProxyError::InvalidRequest(_)
            | ProxyError::UnknownShard(_)
            | ProxyError::InvalidTopology(_) => 400,
            ProxyError::NotFound(_) => 404,
            ProxyError::ShardUnreachable { .. }
            | ProxyError::IncompleteHyperblock { .. }
            | ProxyError::MalformedResponse { .. }
            | ProxyError::PartialFanOut { .. } => 502,
            ProxyError::NoObservers(_) => 503,
            ProxyError::GatewayTimeout(_) => 504,
        }
    }
}

/// Human readable shard label used in logs (`meta` for the sentinel).
pub fn shard_label(shard: ShardId) -> String {
    if shard == METACHAIN_SHARD_ID {
        "meta".to_string()
    } else {
        shard.to_string()
    }
}
