//! # Dispatcher
//!
//! Sends one logical request to the right observer(s).
//!
//! ## Flow (per shard)
//!
//! ```text
//! SELECT ──► SEND ──► 2xx ───────────────► SUCCESS
//!   ▲          │
//!   │          ├────► application error ─► REJECTED (returned as-is)
//!   │          │
//!   └── RETRY ◄┴────► node failure (transport, timeout, 5xx)
//!
//! no candidate left ─────────────────────► EXHAUSTED (ShardUnreachable)
//! ```
//!
//! Each attempt has its own timeout; the whole call is bounded by the
//! request deadline. Fan-outs run one task per shard in a `JoinSet`, so
//! dropping the future aborts every in-flight sibling.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::algorithms::{AttemptMachine, AttemptOutcome, AttemptState, FailurePolicy};
use crate::domain::{
    invariant_shard_in_range, shard_label, DispatchResult, FanOutResult, ProxyConfig,
    ProxyError, RequestDescriptor, ShardId, ShardSelector, METACHAIN_SHARD_ID,
};
use crate::metrics::ProxyMetrics;
use crate::ports::{BackendClient, BackendRequest};
use crate::registry::ObserverRegistry;

/// Timing and routing knobs of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Timeout of one backend attempt
    pub attempt_timeout: Duration,
    /// Deadline of one logical request, retries included
    pub request_deadline: Duration,
    /// Target of shard-agnostic requests
    pub default_shard: ShardId,
    /// Number of regular shards
    pub num_shards: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&ProxyConfig::default())
    }
}

impl From<&ProxyConfig> for DispatchSettings {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            attempt_timeout: config.dispatch.attempt_timeout,
            request_deadline: config.dispatch.request_deadline,
            default_shard: config.general.default_shard,
            num_shards: config.general.num_shards,
        }
    }
}

/// Routes request descriptors to observers with rotation and retries.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ObserverRegistry>,
    backend: Arc<dyn BackendClient>,
    policy: Arc<FailurePolicy>,
    settings: DispatchSettings,
    metrics: Arc<ProxyMetrics>,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(
        registry: Arc<ObserverRegistry>,
        backend: Arc<dyn BackendClient>,
        policy: FailurePolicy,
        settings: DispatchSettings,
        metrics: Arc<ProxyMetrics>,
    ) -> Self {
        Self {
            registry,
            backend,
            policy: Arc::new(policy),
            settings,
            metrics,
        }
    }

    /// Dispatcher settings.
    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Shared registry handle.
    pub fn registry(&self) -> &Arc<ObserverRegistry> {
        &self.registry
    }

    /// Shared metrics handle.
    pub fn metrics(&self) -> &Arc<ProxyMetrics> {
        &self.metrics
    }

    /// Every shard ID a fan-out targets: regular shards, then meta.
    pub fn all_shards(&self) -> Vec<ShardId> {
        (0..self.settings.num_shards)
            .chain(std::iter::once(METACHAIN_SHARD_ID))
            .collect()
    }

    /// Send a single-shard request.
    ///
    /// `AnyShard` goes to the configured default shard. `AllShards` must use
    /// [`Dispatcher::fan_out`].
    pub async fn send(&self, descriptor: &RequestDescriptor) -> Result<DispatchResult, ProxyError> {
        let shard = match descriptor.selector {
            ShardSelector::Shard(shard) => shard,
            ShardSelector::Meta => METACHAIN_SHARD_ID,
            ShardSelector::AnyShard => self.settings.default_shard,
            ShardSelector::AllShards => {
                return Err(ProxyError::InvalidRequest(
                    "all-shards request must be fanned out".to_string(),
                ))
            }
        };
        self.send_to_shard(shard, descriptor).await
    }

    /// Send to an explicit shard, ignoring the descriptor's selector.
    pub async fn send_to_shard(
        &self,
        shard: ShardId,
        descriptor: &RequestDescriptor,
    ) -> Result<DispatchResult, ProxyError> {
        if !invariant_shard_in_range(shard, self.settings.num_shards) {
            return Err(ProxyError::UnknownShard(shard));
        }

        let started = Instant::now();
        let deadline = self.settings.request_deadline;
        let result = match timeout(deadline, self.dispatch_shard(shard, descriptor)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(request_id = %descriptor.id, shard = %shard_label(shard), ?deadline, "Request deadline exceeded");
                self.metrics.record_gateway_timeout();
                Err(ProxyError::GatewayTimeout(deadline))
            }
        };

        self.metrics
            .record_request(result.is_ok(), started.elapsed().as_millis() as u64);
        result
    }

    /// Send the same request to every shard (meta included) concurrently.
    ///
    /// Per-shard failures are reported in the result, not collapsed. Only
    /// idempotent requests may be fanned out.
    pub async fn fan_out(&self, descriptor: &RequestDescriptor) -> Result<FanOutResult, ProxyError> {
        if !descriptor.idempotent {
            return Err(ProxyError::InvalidRequest(
                "non-idempotent request cannot be fanned out".to_string(),
            ));
        }
        self.metrics.record_fan_out();

        let shards = self.all_shards();
        let mut tasks = JoinSet::new();
        for shard in shards.iter().copied() {
            let dispatcher = self.clone();
            let descriptor = descriptor.clone();
            tasks.spawn(async move { (shard, dispatcher.dispatch_shard(shard, &descriptor).await) });
        }

        let deadline = self.settings.request_deadline;
        let started = Instant::now();
        let expires_at = tokio::time::Instant::now() + deadline;
        let mut results = BTreeMap::new();
        loop {
            match tokio::time::timeout_at(expires_at, tasks.join_next()).await {
                Ok(Some(Ok((shard, result)))) => {
                    results.insert(shard, result);
                }
                Ok(Some(Err(err))) => {
                    warn!(request_id = %descriptor.id, error = %err, "Fan-out task aborted")
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        request_id = %descriptor.id,
                        ?deadline,
                        pending = tasks.len(),
                        "Fan-out deadline exceeded, reporting missing shards"
                    );
                    self.metrics.record_gateway_timeout();
                    tasks.abort_all();
                    break;
                }
            }
        }

        // Shards that never answered (deadline or aborted task)
        for shard in shards {
            results
                .entry(shard)
                .or_insert(Err(ProxyError::ShardUnreachable { shard, attempts: 0 }));
        }

        let outcome = FanOutResult { results };
        self.metrics
            .record_request(outcome.is_complete(), started.elapsed().as_millis() as u64);
        Ok(outcome)
    }

    /// Run the attempt state machine over one shard's candidates.
    async fn dispatch_shard(
        &self,
        shard: ShardId,
        descriptor: &RequestDescriptor,
    ) -> Result<DispatchResult, ProxyError> {
        let selection =
            self.registry
                .candidates(shard, descriptor.role, descriptor.allow_role_fallback)?;
        let request = BackendRequest::from(descriptor);
        let mut machine = AttemptMachine::new(selection.nodes.len());

        while let Some(index) = machine.select() {
            let node = &selection.nodes[index];
            self.metrics.record_attempt();
            debug!(
                request_id = %descriptor.id,
                shard = %shard_label(shard),
                observer = %node.url,
                attempt = machine.attempts(),
                path = %descriptor.path,
                "Sending to observer"
            );

            let (outcome, response) =
                match timeout(self.settings.attempt_timeout, self.backend.execute(node, &request)).await {
                    Ok(Ok(response)) => (AttemptOutcome::Status(response.status), Some(response)),
                    Ok(Err(err)) => {
                        debug!(observer = %node.url, error = %err, "Transport error");
                        self.registry.request_sync_check();
                        (AttemptOutcome::TransportError, None)
                    }
                    Err(_) => {
                        self.registry.request_sync_check();
                        (AttemptOutcome::TimedOut, None)
                    }
                };

            match machine.record(self.policy.classify(outcome)) {
                AttemptState::Success { .. } | AttemptState::Rejected { .. } => {
                    let Some(response) = response else {
                        break;
                    };
                    if matches!(machine.state(), AttemptState::Rejected { .. }) {
                        self.metrics.record_rejection();
                        debug!(
                            request_id = %descriptor.id,
                            observer = %node.url,
                            status = response.status,
                            "Observer rejected request"
                        );
                    }
                    return Ok(DispatchResult {
                        status: response.status,
                        body: response.body,
                        observer: node.url.clone(),
                        shard,
                    });
                }
                AttemptState::Retry { .. } => {
                    warn!(
                        request_id = %descriptor.id,
                        shard = %shard_label(shard),
                        observer = %node.url,
                        outcome = ?outcome,
                        idempotent = descriptor.idempotent,
                        "Observer failed, trying next"
                    );
                    self.metrics.record_node_failure(&node.url);
                    self.registry.rotate_on_failure(shard, selection.role, node);
                }
                _ => {}
            }
        }

        self.metrics.record_exhausted();
        error!(
            request_id = %descriptor.id,
            shard = %shard_label(shard),
            attempts = machine.attempts(),
            "All observers of shard failed"
        );
        Err(ProxyError::ShardUnreachable {
            shard,
            attempts: machine.attempts(),
        })
    }
}
