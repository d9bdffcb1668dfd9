//! Shared fixtures: a six-shard network with one scripted backend.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use shard_proxy::{
    shard_label, MockBackend, MockReply, ObserverNode, ProxyConfig, ShardId, ShardProxyService,
    StaticTopologySource, METACHAIN_SHARD_ID,
};

/// Regular shards of the test network.
pub const NUM_SHARDS: u32 = 6;

/// A service with its backend and topology source.
pub struct Network {
    pub service: ShardProxyService,
    pub backend: Arc<MockBackend>,
    pub source: Arc<StaticTopologySource>,
}

/// Observer URL `index` of `shard`.
pub fn observer_url(shard: ShardId, index: usize) -> String {
    format!("http://{}-{}", shard_label(shard), index)
}

/// `per_shard` observers for every shard plus meta.
pub fn observers(per_shard: usize) -> Vec<ObserverNode> {
    (0..NUM_SHARDS)
        .chain(std::iter::once(METACHAIN_SHARD_ID))
        .flat_map(|shard| (0..per_shard).map(move |i| ObserverNode::new(observer_url(shard, i), shard)))
        .collect()
}

/// Hex address owned by `shard` (valid for shards below 8).
pub fn address_in(shard: ShardId) -> String {
    format!("{}{:02x}", "ab".repeat(31), shard)
}

/// Build the network with `per_shard` observers per shard.
pub fn network(per_shard: usize) -> Network {
    let mut config = ProxyConfig::default();
    config.general.num_shards = NUM_SHARDS;
    config.dispatch.attempt_timeout = Duration::from_millis(200);
    config.dispatch.request_deadline = Duration::from_secs(2);
    config.observers = observers(per_shard);

    let backend = Arc::new(MockBackend::new());
    let source = Arc::new(StaticTopologySource::new(config.observers.clone()));
    let service = ShardProxyService::new(&config, backend.clone(), source.clone())
        .expect("test topology is complete");
    Network {
        service,
        backend,
        source,
    }
}

/// Observer envelope of a transaction lookup.
pub fn transaction_reply(hash: &str, sender: ShardId, receiver: ShardId, status: &str) -> MockReply {
    MockReply::data(json!({
        "transaction": {
            "hash": hash,
            "sourceShard": sender,
            "destinationShard": receiver,
            "status": status,
        }
    }))
}

/// Miniblock JSON with one transaction per hash.
pub fn miniblock(source: ShardId, destination: ShardId, hashes: &[&str]) -> Value {
    json!({
        "type": "TxBlock",
        "sourceShard": source,
        "destinationShard": destination,
        "transactions": hashes.iter().map(|h| json!({"hash": h})).collect::<Vec<_>>(),
    })
}

/// Script meta block `nonce` notarizing one block of each of `shards`,
/// and the notarized shard blocks themselves (one transaction each).
pub fn script_hyperblock(backend: &MockBackend, nonce: u64, shards: &[ShardId]) {
    let notarized: Vec<Value> = shards
        .iter()
        .map(|s| json!({"hash": format!("blk-{}", s), "nonce": nonce * 10 + *s as u64, "shard": s}))
        .collect();
    backend.on(
        &observer_url(METACHAIN_SHARD_ID, 0),
        &format!("/block/by-nonce/{}?withTxs=true", nonce),
        MockReply::data(json!({
            "block": {
                "nonce": nonce,
                "shard": METACHAIN_SHARD_ID,
                "hash": format!("meta-{}", nonce),
                "notarizedBlocks": notarized,
            }
        })),
    );
    for &shard in shards {
        let tx = format!("tx-{}", shard);
        backend.on(
            &observer_url(shard, 0),
            &format!("/block/by-hash/blk-{}?withTxs=true", shard),
            MockReply::data(json!({
                "block": {
                    "nonce": nonce * 10 + shard as u64,
                    "shard": shard,
                    "hash": format!("blk-{}", shard),
                    "miniBlocks": [miniblock(shard, shard, &[tx.as_str()])],
                }
            })),
        );
    }
}
