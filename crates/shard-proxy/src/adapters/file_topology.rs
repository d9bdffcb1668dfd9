//! Topology source backed by the proxy's TOML config file.
//!
//! The file is re-read on every load, so editing the observer sections and
//! triggering a reload is enough to change the topology of a running proxy.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{NodeRole, ObserverNode, ProxyConfig};
use crate::ports::{TopologyError, TopologySource};

/// [`TopologySource`] reading `observers` / `full_history_observers` from a file.
#[derive(Debug, Clone)]
pub struct FileTopologySource {
    path: PathBuf,
}

impl FileTopologySource {
    /// Source reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Config file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TopologySource for FileTopologySource {
    async fn load(&self, role: NodeRole) -> Result<Vec<ObserverNode>, TopologyError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| TopologyError::Unavailable(format!("{}: {}", self.path.display(), e)))?;

        let config = ProxyConfig::from_toml_str(&text)
            .map_err(|e| TopologyError::Malformed(e.to_string()))?;

        let nodes = config.observers_for(role);
        debug!(path = %self.path.display(), %role, nodes = nodes.len(), "Loaded topology from file");
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        [[observers]]
        url = "http://127.0.0.1:8081"
        shard = 0

        [[observers]]
        url = "http://127.0.0.1:8082"
        shard = 4294967295

        [[full_history_observers]]
        url = "http://127.0.0.1:9081"
        shard = 0
    "#;

    #[tokio::test]
    async fn test_loads_each_role() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy.toml");
        std::fs::write(&path, CONFIG).unwrap();

        let source = FileTopologySource::new(&path);
        let regular = source.load(NodeRole::Regular).await.unwrap();
        let full_history = source.load(NodeRole::FullHistory).await.unwrap();

        assert_eq!(regular.len(), 2);
        assert_eq!(full_history.len(), 1);
        assert_eq!(full_history[0].url, "http://127.0.0.1:9081");
    }

    #[tokio::test]
    async fn test_picks_up_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy.toml");
        std::fs::write(&path, CONFIG).unwrap();
        let source = FileTopologySource::new(&path);
        assert_eq!(source.load(NodeRole::Regular).await.unwrap().len(), 2);

        std::fs::write(&path, "[[observers]]\nurl = \"http://x\"\nshard = 0\n").unwrap();
        assert_eq!(source.load(NodeRole::Regular).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_unavailable() {
        let source = FileTopologySource::new("/nonexistent/proxy.toml");
        assert!(matches!(
            source.load(NodeRole::Regular).await,
            Err(TopologyError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy.toml");
        std::fs::write(&path, "observers = 3").unwrap();

        let source = FileTopologySource::new(&path);
        assert!(matches!(
            source.load(NodeRole::Regular).await,
            Err(TopologyError::Malformed(_))
        ));
    }
}
