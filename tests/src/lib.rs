//! # Shard Proxy Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── benchmarks/       # Hot paths under load
//! │   ├── shard_mapping.rs
//! │   └── hyperblock_merge.rs
//! │
//! └── integration/      # Whole-service flows against a scripted backend
//!     ├── fixtures.rs
//!     ├── routing.rs
//!     ├── aggregation.rs
//!     └── topology.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p proxy-tests
//!
//! # By category
//! cargo test -p proxy-tests integration::routing
//! cargo test -p proxy-tests integration::aggregation
//!
//! # Benchmarks
//! cargo bench -p proxy-tests
//! ```

#![allow(dead_code)]

pub mod benchmarks;
pub mod integration;
