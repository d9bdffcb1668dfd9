//! # Routing Flows
//!
//! Address mapping, observer failover and batch submission through the
//! public service API.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use shard_proxy::{MockReply, ProxyApi, ProxyError};

    use crate::integration::fixtures::{address_in, network, observer_url, NUM_SHARDS};

    // =============================================================================
    // ADDRESS MAPPING
    // =============================================================================

    #[test]
    fn test_shard_mapping_is_stable() {
        let net = network(1);
        for shard in 0..NUM_SHARDS {
            let address = address_in(shard);
            for _ in 0..3 {
                assert_eq!(net.service.compute_shard_id(&address), Ok(shard));
            }
        }
    }

    #[test]
    fn test_malformed_addresses_rejected() {
        let net = network(1);
        let too_long = "ab".repeat(40);
        for bad in ["", "abc", "zz", "0x1234", too_long.as_str()] {
            assert!(
                matches!(net.service.compute_shard_id(bad), Err(ProxyError::InvalidAddress(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    // =============================================================================
    // FAILOVER
    // =============================================================================

    #[tokio::test]
    async fn test_first_k_observers_fail_then_success() {
        let net = network(3);
        let address = address_in(2);
        let path = format!("/address/{}", address);
        net.backend
            .down(&observer_url(2, 0))
            .down(&observer_url(2, 1))
            .on(&observer_url(2, 2), &path, MockReply::data(json!({"account": {"nonce": 1}})));

        let result = net.service.get_account(&address).await.unwrap();

        assert_eq!(result.observer, observer_url(2, 2));
        assert_eq!(net.service.registry().rotation_count(), 2);
        assert_eq!(net.backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_all_observers_fail() {
        let net = network(3);
        for i in 0..3 {
            net.backend.down(&observer_url(4, i));
        }

        let err = net.service.get_account(&address_in(4)).await.unwrap_err();

        assert_eq!(err, ProxyError::ShardUnreachable { shard: 4, attempts: 3 });
        assert_eq!(net.service.registry().rotation_count(), 3);
    }

    #[tokio::test]
    async fn test_client_error_returned_without_failover() {
        let net = network(3);
        let address = address_in(1);
        net.backend.on(
            &observer_url(1, 0),
            &format!("/address/{}", address),
            MockReply::json(400, json!({"data": null, "error": "bad address", "code": "bad_request"})),
        );

        let result = net.service.get_account(&address).await.unwrap();

        assert_eq!(result.status, 400);
        assert_eq!(net.backend.calls_to(&observer_url(1, 1)), 0);
        assert_eq!(net.backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_sends_spread_evenly() {
        const REQUESTS: usize = 400;
        let net = network(4);
        let address = address_in(3);
        for i in 0..4 {
            net.backend
                .on_any(&observer_url(3, i), MockReply::data(json!({"account": {}})));
        }
        let service = Arc::new(net.service);

        let tasks: Vec<_> = (0..REQUESTS)
            .map(|_| {
                let service = service.clone();
                let address = address.clone();
                tokio::spawn(async move { service.get_account(&address).await })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            assert!(result.unwrap().unwrap().is_success());
        }

        for i in 0..4 {
            assert_eq!(net.backend.calls_to(&observer_url(3, i)), REQUESTS / 4);
        }
    }

    // =============================================================================
    // TRANSACTION SUBMISSION
    // =============================================================================

    #[tokio::test]
    async fn test_batch_split_by_sender_shard() {
        let net = network(1);
        for shard in [0, 5] {
            net.backend.on(
                &observer_url(shard, 0),
                "/transaction/send-multiple",
                MockReply::data(json!({"numOfSentTxs": 1})),
            );
        }

        let submission = net
            .service
            .send_multiple_transactions(vec![
                json!({"sender": address_in(0), "nonce": 1}),
                json!({"sender": address_in(5), "nonce": 1}),
                json!({"nonce": 2}),
            ])
            .await
            .unwrap();

        assert_eq!(submission.total_sent(), 2);
        assert_eq!(submission.invalid, vec![2]);
        assert!(submission.failed.is_empty());
        assert_eq!(net.backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_send_transaction_is_not_retried_on_client_error() {
        let net = network(2);
        net.backend.on(
            &observer_url(0, 0),
            "/transaction/send",
            MockReply::json(400, json!({"data": null, "error": "lowerNonceInTransaction", "code": "bad_request"})),
        );

        let result = net
            .service
            .send_transaction(json!({"sender": address_in(0), "nonce": 0}))
            .await
            .unwrap();

        assert_eq!(result.status, 400);
        assert_eq!(net.backend.call_count(), 1);
    }
}
