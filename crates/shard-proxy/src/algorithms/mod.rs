//! # Algorithms Module
//!
//! Pure building blocks of the proxy: shard mapping, the per-shard attempt
//! state machine, hyperblock merging, transaction lookup interpretation and
//! node sync-state evaluation.

pub mod attempt;
pub mod hyperblock_builder;
pub mod shard_coordinator;
pub mod sync_state;
pub mod transaction_status;

pub use attempt::{AttemptMachine, AttemptOutcome, AttemptState, AttemptVerdict, FailurePolicy};
pub use hyperblock_builder::{build_hyperblock, check_notarized_match, collect_transactions};
pub use shard_coordinator::{decode_address, ShardCoordinator};
pub use sync_state::{parse_node_status, NodeSyncMetrics, NODE_STATUS_PATH};
pub use transaction_status::{interpret_lookup, needs_receiver_lookup, transaction_path, TxLookup};
