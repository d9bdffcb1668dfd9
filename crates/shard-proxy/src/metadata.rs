//! Cached network metadata (economics, network config) from the meta shard.
//!
//! Refreshed on a timer. A failed refresh keeps the previous snapshot until
//! `failure_threshold` consecutive failures, then the snapshot is dropped so
//! stale data is not served forever.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::domain::{ProxyError, RequestDescriptor, ShardSelector};

/// Observer path of the economics metrics.
pub const ECONOMICS_PATH: &str = "/network/economics";

/// Observer path of the network configuration.
pub const NETWORK_CONFIG_PATH: &str = "/network/config";

#[derive(Debug, Default, Clone)]
struct Snapshot {
    economics: Option<Value>,
    network_config: Option<Value>,
}

/// Periodically refreshed metadata snapshot.
pub struct MetadataCache {
    dispatcher: Dispatcher,
    snapshot: RwLock<Snapshot>,
    consecutive_failures: AtomicU32,
    failure_threshold: u32,
}

impl MetadataCache {
    /// Empty cache; call [`MetadataCache::refresh`] to populate it.
    pub fn new(dispatcher: Dispatcher, failure_threshold: u32) -> Self {
        Self {
            dispatcher,
            snapshot: RwLock::new(Snapshot::default()),
            consecutive_failures: AtomicU32::new(0),
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Cached economics `data`, if any.
    pub fn economics(&self) -> Option<Value> {
        self.snapshot.read().economics.clone()
    }

    /// Cached network config `data`, if any.
    pub fn network_config(&self) -> Option<Value> {
        self.snapshot.read().network_config.clone()
    }

    /// Consecutive failed refreshes.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Fetch both documents from the meta shard.
    pub async fn refresh(&self) -> Result<(), ProxyError> {
        let fetched = async {
            let economics = self.fetch(ECONOMICS_PATH).await?;
            let network_config = self.fetch(NETWORK_CONFIG_PATH).await?;
            Ok::<_, ProxyError>(Snapshot {
                economics: Some(economics),
                network_config: Some(network_config),
            })
        }
        .await;

        match fetched {
            Ok(snapshot) => {
                *self.snapshot.write() = snapshot;
                self.consecutive_failures.store(0, Ordering::Relaxed);
                debug!("Network metadata refreshed");
                Ok(())
            }
            Err(err) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(failures, error = %err, "Network metadata refresh failed");
                if failures >= self.failure_threshold {
                    *self.snapshot.write() = Snapshot::default();
                    warn!(failures, "Dropped cached network metadata");
                }
                Err(err)
            }
        }
    }

    async fn fetch(&self, path: &str) -> Result<Value, ProxyError> {
        let descriptor = RequestDescriptor::get(path).to(ShardSelector::Meta);
        let result = self.dispatcher.send(&descriptor).await?;
        if !result.is_success() {
            return Err(ProxyError::InvalidRequest(format!(
                "{} answered status {}",
                path, result.status
            )));
        }
        Ok(result.envelope()?.data)
    }

    /// Refresh every `interval` until shutdown. The first refresh runs immediately.
    pub fn spawn_periodic(
        self: std::sync::Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Failures are logged and counted inside refresh
                        let _ = self.refresh().await;
                    }
                    _ = shutdown.changed() => {
                        info!("Metadata refresher shutting down");
                        break;
                    }
                }
            }
        })
    }
}
