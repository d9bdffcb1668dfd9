//! # Shard Proxy
//!
//! Gateway core in front of a sharded blockchain.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Clients talk to one endpoint; the proxy works out which shard owns the
//! data and forwards the call to an observer node of that shard:
//! - Address to shard mapping (bit-masked, metachain-aware)
//! - Observer selection with rotation and failover
//! - Cross-shard transaction resolution (sender + receiver shard)
//! - Hyperblock assembly (meta block + notarized shard blocks)
//! - Hot topology reload without dropping in-flight requests
//! - Observer sync-state checks (lagging nodes tried last)
//!
//! ## Failure Handling
//!
//! | Condition | Outcome |
//! |-----------|---------|
//! | Observer transport error / 5xx | Next observer of the shard |
//! | Observer 4xx | Returned to the caller as-is |
//! | All observers of a shard failed | `ShardUnreachable` |
//! | Request deadline elapsed | `GatewayTimeout` (fan-out: missing shards reported per shard) |
//! | Observer lagging behind its shard | Tried after every synced observer |
//! | One shard block missing | `IncompleteHyperblock`, never a partial one |
//!
//! ## Module Structure
//!
//! ```text
//! shard-proxy/
//! ├── domain/          # Topology, requests, results, errors, config
//! ├── algorithms/      # Shard mapping, attempt machine, tx status, hyperblock merge
//! ├── ports/           # ProxyApi + BackendClient / TopologySource
//! ├── adapters/        # reqwest backend, topology file, address cache
//! ├── registry         # Observer pools per shard
//! ├── dispatcher       # SELECT -> SEND -> SUCCESS / RETRY / EXHAUSTED
//! ├── resolver         # Cross-shard transaction lookup
//! ├── hyperblock       # Hyperblock assembly
//! ├── refresher        # Topology reload
//! ├── sync_checker     # /node/status polling, demotes lagging observers
//! ├── metadata         # Economics / network config cache
//! └── service          # Wires everything behind ProxyApi
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod dispatcher;
pub mod domain;
pub mod hyperblock;
pub mod metadata;
pub mod metrics;
pub mod ports;
pub mod refresher;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod sync_checker;

// Re-exports
pub use adapters::{AddressShardCache, FileTopologySource, HttpBackendClient};
pub use algorithms::{
    build_hyperblock, interpret_lookup, AttemptMachine, AttemptVerdict, FailurePolicy,
    NodeSyncMetrics, ShardCoordinator, TxLookup,
};
pub use dispatcher::{DispatchSettings, Dispatcher};
pub use domain::{
    invariant_nodes_well_formed, invariant_topology_complete, shard_label, BatchSubmission,
    BlockQuery, ConfigError, DispatchResult, FanOutResult, Hyperblock, HyperblockMode, NodeRole,
    ObserverNode, ProxyConfig, ProxyError, ReloadOutcome, ReloadStatus, RequestDescriptor,
    ResolvedTransaction, ShardId, ShardSelector, SyncCheckConfig, Topology, METACHAIN_SHARD_ID,
};
pub use hyperblock::HyperblockAssembler;
pub use metadata::MetadataCache;
pub use metrics::ProxyMetrics;
pub use ports::{
    BackendClient, MockBackend, MockReply, ProxyApi, StaticTopologySource, TopologyError,
    TopologySource, TransportError,
};
pub use refresher::TopologyRefresher;
pub use registry::{ObserverRegistry, Selection};
pub use resolver::CrossShardResolver;
pub use service::ShardProxyService;
pub use sync_checker::{NodeSyncChecker, SyncReport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
