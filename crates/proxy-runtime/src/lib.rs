//! # Shard Proxy Runtime
//!
//! Wires the shard-proxy core to real adapters and runs its background work.
//!
//! ## Startup Sequence
//!
//! 1. Load and validate configuration (TOML file + CLI overrides)
//! 2. Build the reqwest backend and the config-file topology source
//! 3. Create the proxy service (startup topology must be complete)
//! 4. Spawn the topology refresher, metadata refresher and sync checker
//! 5. Serve the admin API
//! 6. Wait for shutdown, then stop every task through one watch channel

pub mod admin;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use shard_proxy::{FileTopologySource, HttpBackendClient, ProxyConfig, ShardProxyService};

pub use admin::admin_router;

/// Command-line overrides applied on top of the configuration file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    /// Number of regular shards
    pub num_shards: Option<u32>,
    /// Admin server port
    pub admin_port: Option<u16>,
    /// Skip observer sync-state checks
    pub no_status_check: bool,
}

/// Load a configuration file, apply `overrides` and validate the result.
pub fn load_config(path: &Path, overrides: Overrides) -> Result<ProxyConfig> {
    let mut config = ProxyConfig::from_file(path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    if let Some(num_shards) = overrides.num_shards {
        config.general.num_shards = num_shards;
    }
    if let Some(port) = overrides.admin_port {
        config.admin.port = port;
    }
    if overrides.no_status_check {
        config.sync_check.enabled = false;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// The proxy runtime owning the service and its background tasks.
pub struct ProxyRuntime {
    config: ProxyConfig,
    service: Arc<ShardProxyService>,
    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,
    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ProxyRuntime {
    /// Create the runtime. `config_path` doubles as the topology source.
    pub fn new(config: ProxyConfig, config_path: impl Into<PathBuf>) -> Result<Self> {
        // Create backend client
        let backend = Arc::new(
            HttpBackendClient::from_config(&config.dispatch)
                .context("building observer HTTP client")?,
        );

        // Create topology source
        let source = Arc::new(FileTopologySource::new(config_path));

        // Create service
        let service = Arc::new(
            ShardProxyService::new(&config, backend, source)
                .context("startup topology rejected")?,
        );

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            service,
            shutdown_tx,
            shutdown_rx,
            tasks: Vec::new(),
        })
    }

    /// The proxy service.
    pub fn service(&self) -> &Arc<ShardProxyService> {
        &self.service
    }

    /// Spawn the refreshers and the admin server.
    pub async fn start(&mut self) -> Result<()> {
        info!("===========================================");
        info!("  Shard Proxy v{}", shard_proxy::VERSION);
        info!(
            "  Shards: {} + meta, observers: {}",
            self.config.general.num_shards,
            self.config.observers.len()
        );
        info!("===========================================");

        let refresh = &self.config.refresh;
        if refresh.topology_interval.is_zero() {
            info!("Periodic topology reload disabled");
        } else {
            self.tasks.push(
                self.service
                    .refresher()
                    .spawn_periodic(refresh.topology_interval, self.shutdown_rx.clone()),
            );
        }

        self.tasks.push(
            Arc::clone(self.service.metadata())
                .spawn_periodic(refresh.metadata_interval, self.shutdown_rx.clone()),
        );

        let checker = self.service.sync_checker();
        if checker.enabled() {
            self.tasks
                .push(checker.spawn_periodic(self.shutdown_rx.clone()));
        } else {
            info!("Observer sync checks disabled, every observer counts as synced");
        }

        if self.config.admin.enabled {
            let addr = self.config.admin_addr();
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding admin server to {}", addr))?;
            let router = admin_router(Arc::clone(&self.service));
            let mut shutdown = self.shutdown_rx.clone();

            info!(%addr, "Starting admin server");
            self.tasks.push(tokio::spawn(async move {
                let served = axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown.changed().await;
                    })
                    .await;
                if let Err(e) = served {
                    warn!(error = %e, "Admin server stopped with error");
                }
            }));
        }

        info!("Shard proxy ready");
        Ok(())
    }

    /// Signal shutdown and wait for every background task.
    pub async fn shutdown(&mut self) {
        info!("Shutting down shard proxy");
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Shard proxy stopped");
    }
}
