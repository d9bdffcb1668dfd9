//! # Aggregation Flows
//!
//! Hyperblock assembly and cross-shard transaction resolution.

#[cfg(test)]
mod tests {
    use shard_proxy::{MockReply, ProxyApi, ProxyError};

    use crate::integration::fixtures::{
        address_in, network, observer_url, script_hyperblock, transaction_reply, NUM_SHARDS,
    };

    const TX_HASH: &str = "c0ffee";

    fn tx_path() -> String {
        format!("/transaction/{}", TX_HASH)
    }

    // =============================================================================
    // HYPERBLOCKS
    // =============================================================================

    #[tokio::test]
    async fn test_hyperblock_contains_exactly_notarized_shards() {
        let net = network(1);
        script_hyperblock(&net.backend, 9, &[0, 2, 4]);

        let hyperblock = net.service.get_hyperblock_by_nonce(9).await.unwrap();

        let referenced: Vec<_> = hyperblock.shard_blocks.iter().map(|b| b.shard).collect();
        assert_eq!(referenced, vec![0, 2, 4]);
        assert_eq!(hyperblock.transaction_shards(), vec![0, 2, 4]);
        for tx in &hyperblock.transactions {
            assert_eq!(tx.transaction["hash"], format!("tx-{}", tx.shard));
        }
        // Shards not notarized by the meta block are never asked
        for shard in [1, 3, 5] {
            assert_eq!(net.backend.calls_to(&observer_url(shard, 0)), 0);
        }
    }

    #[tokio::test]
    async fn test_hyperblock_fails_whole_when_one_shard_is_down() {
        let net = network(1);
        script_hyperblock(&net.backend, 9, &[0, 1, 2]);
        net.backend.down(&observer_url(1, 0));

        let err = net.service.get_hyperblock_by_nonce(9).await.unwrap_err();

        assert!(
            matches!(err, ProxyError::IncompleteHyperblock { shard: 1, .. }),
            "got {:?}",
            err
        );
    }

    #[tokio::test]
    async fn test_hyperblock_of_unknown_nonce() {
        let net = network(1);
        let err = net.service.get_hyperblock_by_nonce(404).await.unwrap_err();
        assert!(matches!(err, ProxyError::NotFound(_)));
    }

    // =============================================================================
    // CROSS-SHARD TRANSACTIONS
    // =============================================================================

    #[tokio::test]
    async fn test_receiver_status_wins_with_sender_hint() {
        let net = network(1);
        net.backend
            .on(&observer_url(2, 0), &tx_path(), transaction_reply(TX_HASH, 2, 5, "pending"))
            .on(&observer_url(5, 0), &tx_path(), transaction_reply(TX_HASH, 2, 5, "success"));

        let resolved = net
            .service
            .get_transaction(TX_HASH, Some(&address_in(2)), false)
            .await
            .unwrap();

        assert_eq!(resolved.shard, 5);
        assert_eq!(resolved.info.status, "success");
        assert!(resolved.calls <= 2);
        assert_eq!(net.backend.call_count(), 2);
        assert_eq!(net.backend.calls()[0].url, observer_url(2, 0));
        assert_eq!(net.backend.calls()[1].url, observer_url(5, 0));
    }

    #[tokio::test]
    async fn test_receiver_down_degrades_to_sender_snapshot() {
        let net = network(1);
        net.backend
            .on(&observer_url(2, 0), &tx_path(), transaction_reply(TX_HASH, 2, 5, "pending"))
            .down(&observer_url(5, 0));

        let status = net
            .service
            .get_transaction(TX_HASH, Some(&address_in(2)), false)
            .await
            .unwrap();

        assert_eq!(status.shard, 2);
        assert!(status.degraded);
        assert_eq!(status.info.status, "pending");
    }

    #[tokio::test]
    async fn test_status_without_hint_uses_fan_out() {
        let net = network(1);
        net.backend
            .on(&observer_url(2, 0), &tx_path(), transaction_reply(TX_HASH, 2, 5, "pending"))
            .on(&observer_url(5, 0), &tx_path(), transaction_reply(TX_HASH, 2, 5, "success"));

        let status = net
            .service
            .get_transaction_status(TX_HASH, None)
            .await
            .unwrap();

        assert_eq!(status, "success");
        // One call per shard plus meta, no follow-up
        assert_eq!(net.backend.call_count(), NUM_SHARDS as usize + 1);
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let net = network(1);
        let err = net
            .service
            .get_transaction(TX_HASH, Some(&address_in(3)), false)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fan_out_reports_every_shard() {
        let net = network(1);
        net.backend
            .on_any(&observer_url(0, 0), MockReply::data(serde_json::json!({"ok": true})))
            .down(&observer_url(3, 0));

        let fan_out = net
            .service
            .fan_out(&shard_proxy::RequestDescriptor::get("/node/status"))
            .await
            .unwrap();

        assert_eq!(fan_out.results.len(), NUM_SHARDS as usize + 1);
        assert_eq!(fan_out.failed_shards(), vec![3]);
        assert!(!fan_out.is_complete());
    }
}
