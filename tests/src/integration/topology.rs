//! # Topology Flows
//!
//! Reloads seen from the request path: rejected lists change nothing,
//! accepted ones apply to the next request only.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use shard_proxy::{
        FileTopologySource, MockBackend, MockReply, NodeRole, ObserverNode, ProxyApi, ProxyConfig,
        ReloadStatus, ShardProxyService, METACHAIN_SHARD_ID,
    };

    use crate::integration::fixtures::{address_in, network, observer_url, observers, NUM_SHARDS};

    fn account_reply() -> MockReply {
        MockReply::data(json!({"account": {"balance": "0"}}))
    }

    /// Config file text with one `http://{prefix}-{shard}` observer per shard.
    fn config_text(prefix: &str) -> String {
        let mut text = format!("[general]\nnum_shards = {}\n", NUM_SHARDS);
        for shard in (0..NUM_SHARDS).chain(std::iter::once(METACHAIN_SHARD_ID)) {
            text.push_str(&format!(
                "\n[[observers]]\nurl = \"http://{}-{}\"\nshard = {}\n",
                prefix, shard, shard
            ));
        }
        text
    }

    #[tokio::test]
    async fn test_reload_missing_shard_rejected() {
        let net = network(1);
        let mut incomplete = observers(1);
        incomplete.retain(|node| node.shard != 3);
        net.source.set(NodeRole::Regular, incomplete);
        net.backend.on_any(&observer_url(3, 0), account_reply());

        let outcome = net.service.reload_observers().await;
        assert_eq!(outcome.status, ReloadStatus::Rejected);

        let result = net.service.get_account(&address_in(3)).await.unwrap();
        assert_eq!(result.observer, observer_url(3, 0));
        assert_eq!(net.service.registry().generation(), 0);
    }

    #[tokio::test]
    async fn test_accepted_reload_routes_to_new_observers() {
        let net = network(1);
        let replacement: Vec<ObserverNode> = (0..NUM_SHARDS)
            .chain(std::iter::once(METACHAIN_SHARD_ID))
            .map(|shard| ObserverNode::new(format!("http://new-{}", shard), shard))
            .collect();
        net.source.set(NodeRole::Regular, replacement);
        net.backend.on_any("http://new-1", account_reply());
        net.service.compute_shard_id(&address_in(1)).unwrap();

        let outcome = net.service.reload_observers().await;
        assert_eq!(outcome.status, ReloadStatus::Reloaded);
        assert!(net.service.cache().is_empty());

        let result = net.service.get_account(&address_in(1)).await.unwrap();
        assert_eq!(result.observer, "http://new-1");
    }

    #[tokio::test]
    async fn test_in_flight_request_survives_reload() {
        let net = network(1);
        let slow = observer_url(0, 0);
        net.backend
            .on_any(&slow, account_reply())
            .delay(&slow, Duration::from_millis(100));
        let service = Arc::new(net.service);

        let in_flight = {
            let service = service.clone();
            tokio::spawn(async move { service.get_account(&address_in(0)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let replacement: Vec<ObserverNode> = observers(1)
            .into_iter()
            .map(|node| ObserverNode::new(format!("{}-v2", node.url), node.shard))
            .collect();
        net.source.set(NodeRole::Regular, replacement);
        assert!(service.reload_observers().await.accepted());

        let result = in_flight.await.unwrap().unwrap();
        assert_eq!(result.observer, slow);
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_reload_from_edited_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy.toml");
        std::fs::write(&path, config_text("old")).unwrap();

        let config = ProxyConfig::from_file(&path).unwrap();
        let backend = Arc::new(MockBackend::new());
        backend
            .on_any("http://old-2", account_reply())
            .on_any("http://new-2", account_reply());
        let source = Arc::new(FileTopologySource::new(&path));
        let service = ShardProxyService::new(&config, backend.clone(), source).unwrap();

        let before = service.get_account(&address_in(2)).await.unwrap();
        assert_eq!(before.observer, "http://old-2");

        std::fs::write(&path, config_text("new")).unwrap();
        assert!(service.reload_observers().await.accepted());
        let after = service.get_account(&address_in(2)).await.unwrap();
        assert_eq!(after.observer, "http://new-2");

        // An unparsable edit fails the reload and keeps routing as it was
        std::fs::write(&path, "[[observers]]\nurl = 5\n").unwrap();
        let outcome = service.reload_observers().await;
        assert_eq!(outcome.status, ReloadStatus::Failed);
        assert_eq!(service.registry().generation(), 1);
        let unchanged = service.get_account(&address_in(2)).await.unwrap();
        assert_eq!(unchanged.observer, "http://new-2");
    }

    fn node_status(nonce: u64, highest: u64) -> MockReply {
        MockReply::data(json!({"metrics": {
            "erd_nonce": nonce,
            "erd_probable_highest_nonce": highest,
            "erd_are_vm_queries_ready": "true",
        }}))
    }

    #[tokio::test]
    async fn test_lagging_observer_tried_last_until_synced() {
        let net = network(2);
        for node in observers(2) {
            net.backend.on(&node.url, "/node/status", node_status(500, 500));
            net.backend.on_any(&node.url, account_reply());
        }
        let lagging = observer_url(3, 0);
        net.backend.on(&lagging, "/node/status", node_status(400, 500));

        let report = net.service.sync_checker().check_all().await;
        assert_eq!(report.checked, observers(2).len());
        assert_eq!(report.out_of_sync, vec![lagging.clone()]);

        for _ in 0..4 {
            let result = net.service.get_account(&address_in(3)).await.unwrap();
            assert_eq!(result.observer, observer_url(3, 1));
        }

        net.backend.on(&lagging, "/node/status", node_status(500, 500));
        net.service.sync_checker().check_all().await;
        let address = address_in(3);
        let served: Vec<String> = futures::future::join_all(
            (0..4).map(|_| net.service.get_account(&address)),
        )
        .await
        .into_iter()
        .map(|result| result.unwrap().observer)
        .collect();
        assert!(served.contains(&lagging));
    }

    #[tokio::test]
    async fn test_full_history_reload_is_independent() {
        let net = network(1);
        net.source.set(
            NodeRole::FullHistory,
            vec![ObserverNode::new("http://archive-0", 0).with_role(NodeRole::FullHistory)],
        );
        net.backend
            .on_any("http://archive-0", MockReply::data(json!({"block": {"nonce": 1, "shard": 0}})));

        let outcome = net.service.reload_full_history_observers().await;
        assert!(outcome.accepted());

        let block = net
            .service
            .get_block(0, shard_proxy::BlockQuery::Nonce(1), false)
            .await
            .unwrap();
        assert_eq!(block.observer, "http://archive-0");

        // Regular requests keep using the regular pool
        net.backend.on_any(&observer_url(0, 0), account_reply());
        let account = net.service.get_account(&address_in(0)).await.unwrap();
        assert_eq!(account.observer, observer_url(0, 0));
    }
}
