//! # Integration Flows
//!
//! Drive a full [`shard_proxy::ShardProxyService`] against a scripted
//! backend and check the behavior callers observe.

pub mod fixtures;

mod aggregation;
mod routing;
mod topology;
