//! # Shard Proxy Benchmarks
//!
//! Hot paths of the proxy core, exercised with realistic sizes.

pub mod hyperblock_merge;
pub mod shard_mapping;
