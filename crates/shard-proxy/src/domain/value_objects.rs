//! # Value Objects
//!
//! Request descriptors, dispatch and fan-out results, reload outcomes.

use super::entities::{NodeRole, TransactionInfo};
use super::errors::{ProxyError, ShardId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// HTTP method of a forwarded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// Where a request must go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShardSelector {
    /// A specific regular shard (or the meta sentinel)
    Shard(ShardId),
    /// The coordinating shard
    Meta,
    /// Any single shard; the query is shard-agnostic
    AnyShard,
    /// Every regular shard plus meta (fan-out)
    AllShards,
}

/// Immutable description of one logical request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    /// Correlation ID for logs
    pub id: Uuid,
    /// HTTP method
    pub method: HttpMethod,
    /// Path (with query string), e.g. `/address/abcd`
    pub path: String,
    /// JSON body for POST requests
    pub body: Option<Value>,
    /// Target shard(s)
    pub selector: ShardSelector,
    /// False for transaction submission
    pub idempotent: bool,
    /// Preferred node role
    pub role: NodeRole,
    /// Serve from regular nodes when the preferred role has none for the shard
    pub allow_role_fallback: bool,
}

impl RequestDescriptor {
    fn new(method: HttpMethod, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            body,
            selector: ShardSelector::AnyShard,
            idempotent: true,
            role: NodeRole::Regular,
            allow_role_fallback: true,
        }
    }

    /// GET request, shard-agnostic until `to` is called.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path, None)
    }

    /// POST request with a JSON body.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path, Some(body))
    }

    /// Set the target selector.
    pub fn to(mut self, selector: ShardSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Mark as non-idempotent (transaction submission).
    pub fn non_idempotent(mut self) -> Self {
        self.idempotent = false;
        self
    }

    /// Prefer full-history nodes, falling back to regular ones when the shard has none.
    pub fn full_history(mut self) -> Self {
        self.role = NodeRole::FullHistory;
        self.allow_role_fallback = true;
        self
    }

    /// Require full-history nodes; fail instead of falling back.
    pub fn full_history_only(mut self) -> Self {
        self.role = NodeRole::FullHistory;
        self.allow_role_fallback = false;
        self
    }
}

/// Raw outcome of one successful backend exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    /// HTTP status returned by the node
    pub status: u16,
    /// Raw body
    pub body: String,
    /// URL of the node that answered
    pub observer: String,
    /// Shard the node belongs to
    pub shard: ShardId,
}

impl DispatchResult {
    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as the observers' generic response envelope.
    pub fn envelope(&self) -> Result<ApiEnvelope, ProxyError> {
        serde_json::from_str(&self.body).map_err(|e| ProxyError::MalformedResponse {
            observer: self.observer.clone(),
            reason: e.to_string(),
        })
    }

    /// Parse one field of the envelope's `data` object.
    pub fn data_field<T: DeserializeOwned>(&self, field: &str) -> Result<T, ProxyError> {
        let envelope = self.envelope()?;
        envelope
            .field(field)
            .map_err(|reason| ProxyError::MalformedResponse {
                observer: self.observer.clone(),
                reason,
            })
    }
}

/// Per-shard results of an "all shards" dispatch, keyed by shard ID.
///
/// Keyed (not arrival-ordered) so merging is deterministic; meta sorts last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutResult {
    /// One entry per targeted shard
    pub results: BTreeMap<ShardId, Result<DispatchResult, ProxyError>>,
}

impl FanOutResult {
    /// Shards that answered, in shard order.
    pub fn successes(&self) -> impl Iterator<Item = (ShardId, &DispatchResult)> + '_ {
        self.results
            .iter()
            .filter_map(|(shard, res)| res.as_ref().ok().map(|r| (*shard, r)))
    }

    /// Shards that failed, in shard order.
    pub fn failed_shards(&self) -> Vec<ShardId> {
        self.results
            .iter()
            .filter(|(_, res)| res.is_err())
            .map(|(shard, _)| *shard)
            .collect()
    }

    /// Whether every shard answered.
    pub fn is_complete(&self) -> bool {
        self.results.values().all(Result::is_ok)
    }

    /// Collapse into a single aggregate error when any shard failed.
    pub fn into_all_or_nothing(self) -> Result<BTreeMap<ShardId, DispatchResult>, ProxyError> {
        let failed = self.failed_shards();
        if !failed.is_empty() {
            return Err(ProxyError::PartialFanOut { failed });
        }
        Ok(self
            .results
            .into_iter()
            .filter_map(|(shard, res)| res.ok().map(|r| (shard, r)))
            .collect())
    }
}

/// Answer of a cross-shard transaction resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTransaction {
    /// Shard whose answer is returned
    pub shard: ShardId,
    /// Parsed transaction fields
    pub info: TransactionInfo,
    /// Raw answer of that shard
    pub result: DispatchResult,
    /// Dispatcher calls spent
    pub calls: usize,
    /// Receiver shard failed; sender-shard snapshot returned instead
    pub degraded: bool,
}

/// Outcome of a batch transaction submission, per sender shard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSubmission {
    /// Transactions acknowledged per shard
    pub sent: BTreeMap<ShardId, usize>,
    /// Shards whose group could not be delivered
    pub failed: BTreeMap<ShardId, ProxyError>,
    /// Indices of transactions with an unusable sender
    pub invalid: Vec<usize>,
}

impl BatchSubmission {
    /// Total acknowledged transactions.
    pub fn total_sent(&self) -> usize {
        self.sent.values().sum()
    }
}

/// Generic `{ data, error, code }` envelope every observer endpoint returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiEnvelope {
    /// Payload
    pub data: Value,
    /// Error text (empty on success)
    pub error: String,
    /// Return code (`successful`, `bad_request`, `internal_issue`)
    pub code: String,
}

impl ApiEnvelope {
    /// Deserialize `data.<name>`.
    pub fn field<T: DeserializeOwned>(&self, name: &str) -> Result<T, String> {
        let value = self
            .data
            .get(name)
            .ok_or_else(|| format!("missing field data.{}", name))?;
        serde_json::from_value(value.clone()).map_err(|e| format!("data.{}: {}", name, e))
    }
}

/// Block lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockQuery {
    /// By nonce
    Nonce(u64),
    /// By hash
    Hash(String),
}

impl BlockQuery {
    /// Observer path for this lookup.
    pub fn path(&self, with_txs: bool) -> String {
        let base = match self {
            BlockQuery::Nonce(nonce) => format!("/block/by-nonce/{}", nonce),
            BlockQuery::Hash(hash) => format!("/block/by-hash/{}", hash),
        };
        if with_txs {
            format!("{}?withTxs=true", base)
        } else {
            base
        }
    }
}

impl fmt::Display for BlockQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockQuery::Nonce(nonce) => write!(f, "nonce {}", nonce),
            BlockQuery::Hash(hash) => write!(f, "hash {}", hash),
        }
    }
}

/// Which miniblocks of a block count towards a hyperblock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HyperblockMode {
    /// Only transactions executed in their destination shard
    #[default]
    Finalized,
    /// Transactions as soon as they are notarized in their source shard
    NotarizedAtSource,
}

/// Kind of reload outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadStatus {
    /// New topology active
    Reloaded,
    /// Validation failure; old topology retained
    Rejected,
    /// Internal failure (source unavailable); old topology retained
    Failed,
}

/// Structured answer to an administrative reload trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadOutcome {
    /// Outcome kind
    pub status: ReloadStatus,
    /// Human readable description
    pub description: String,
    /// Error text (empty on success)
    pub error: String,
}

impl ReloadOutcome {
    /// Successful reload.
    pub fn reloaded(description: impl Into<String>) -> Self {
        Self {
            status: ReloadStatus::Reloaded,
            description: description.into(),
            error: String::new(),
        }
    }

    /// Validation failure.
    pub fn rejected(description: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: ReloadStatus::Rejected,
            description: description.into(),
            error: error.into(),
        }
    }

    /// Internal failure.
    pub fn failed(description: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: ReloadStatus::Failed,
            description: description.into(),
            error: error.into(),
        }
    }

    /// Whether the new topology was accepted.
    pub fn accepted(&self) -> bool {
        self.status == ReloadStatus::Reloaded
    }
}
