//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements outbound port traits (HTTP backend, file topology source) and
//! the address to shard cache.

mod address_cache;
mod file_topology;
mod http_backend;

pub use address_cache::{AddressShardCache, CacheEntry};
pub use file_topology::FileTopologySource;
pub use http_backend::HttpBackendClient;
