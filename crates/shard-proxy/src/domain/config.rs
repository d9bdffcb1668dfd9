//! Proxy configuration with validation.
//!
//! Every section deserializes with defaults, so a TOML file only has to list
//! what it changes (usually just the observers).

use super::entities::{NodeRole, ObserverNode, Topology};
use super::errors::ShardId;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Main proxy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Shard layout and caching
    pub general: GeneralConfig,
    /// Per-attempt and per-request timing
    pub dispatch: DispatchConfig,
    /// What counts as a node failure
    pub failure_policy: FailurePolicyConfig,
    /// Background refresh timers
    pub refresh: RefreshConfig,
    /// Observer sync-state checks
    pub sync_check: SyncCheckConfig,
    /// Admin server
    pub admin: AdminConfig,
    /// Regular observers
    pub observers: Vec<ObserverNode>,
    /// Full-history observers
    pub full_history_observers: Vec<ObserverNode>,
}

impl ProxyConfig {
    /// Parse from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.num_shards == 0 {
            return Err(ConfigError::InvalidShards(
                "num_shards cannot be 0".into(),
            ));
        }

        if self.general.default_shard >= self.general.num_shards {
            return Err(ConfigError::InvalidShards(format!(
                "default_shard {} must be below num_shards {}",
                self.general.default_shard, self.general.num_shards
            )));
        }

        if self.general.address_cache_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "address_cache_capacity cannot be 0".into(),
            ));
        }

        // Validate timeouts
        if self.dispatch.attempt_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "attempt_timeout cannot be 0".into(),
            ));
        }

        if self.dispatch.request_deadline.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request_deadline cannot be 0".into(),
            ));
        }

        if self.dispatch.attempt_timeout > self.dispatch.request_deadline {
            return Err(ConfigError::InvalidTimeout(
                "attempt_timeout cannot exceed request_deadline".into(),
            ));
        }

        if self.refresh.metadata_failure_threshold == 0 {
            return Err(ConfigError::InvalidLimit(
                "metadata_failure_threshold cannot be 0".into(),
            ));
        }

        if self.sync_check.enabled {
            if self.sync_check.interval.is_zero() {
                return Err(ConfigError::InvalidTimeout(
                    "sync_check.interval cannot be 0".into(),
                ));
            }
            if self.sync_check.status_timeout.is_zero() {
                return Err(ConfigError::InvalidTimeout(
                    "sync_check.status_timeout cannot be 0".into(),
                ));
            }
            if self.sync_check.nonce_threshold == 0 {
                return Err(ConfigError::InvalidLimit(
                    "sync_check.nonce_threshold cannot be 0".into(),
                ));
            }
        }

        if self.observers.is_empty() {
            return Err(ConfigError::NoObservers);
        }

        Ok(())
    }

    /// Initial topology from both observer sections.
    pub fn topology(&self) -> Topology {
        Topology::default()
            .with_role(NodeRole::Regular, self.observers.clone())
            .with_role(NodeRole::FullHistory, self.full_history_observers.clone())
    }

    /// Observer section for a role.
    pub fn observers_for(&self, role: NodeRole) -> Vec<ObserverNode> {
        match role {
            NodeRole::Regular => self.observers.clone(),
            NodeRole::FullHistory => self.full_history_observers.clone(),
        }
    }

    /// Admin server bind address
    pub fn admin_addr(&self) -> SocketAddr {
        SocketAddr::new(self.admin.host, self.admin.port)
    }
}

/// Shard layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Number of regular shards (meta excluded)
    pub num_shards: u32,
    /// Shard used for shard-agnostic queries
    pub default_shard: ShardId,
    /// Address to shard cache capacity (LRU)
    pub address_cache_capacity: usize,
    /// Hyperblocks collect transactions notarized at source instead of finalized ones
    pub notarized_at_source: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            num_shards: 3,
            default_shard: 0,
            address_cache_capacity: 10_000,
            notarized_at_source: false,
        }
    }
}

/// Dispatch timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Timeout of a single backend attempt
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,
    /// Overall deadline of one logical request, retries included
    #[serde(with = "humantime_serde")]
    pub request_deadline: Duration,
    /// TCP connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(10),
            request_deadline: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

/// Node failure classification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailurePolicyConfig {
    /// Treat 5xx as node failures (rotate to the next node)
    pub server_errors_are_node_failures: bool,
    /// Extra status codes treated as node failures (e.g. 429)
    pub extra_node_failure_codes: Vec<u16>,
    /// Status codes returned to the caller as-is even when they would rotate
    pub application_error_codes: Vec<u16>,
}

impl Default for FailurePolicyConfig {
    fn default() -> Self {
        Self {
            server_errors_are_node_failures: true,
            extra_node_failure_codes: Vec::new(),
            application_error_codes: Vec::new(),
        }
    }
}

/// Background refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Topology reload period (0 = administrative trigger only)
    #[serde(with = "humantime_serde")]
    pub topology_interval: Duration,
    /// Network metadata refresh period
    #[serde(with = "humantime_serde")]
    pub metadata_interval: Duration,
    /// Consecutive metadata failures before the cached value is dropped
    pub metadata_failure_threshold: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            topology_interval: Duration::ZERO,
            metadata_interval: Duration::from_secs(60),
            metadata_failure_threshold: 10,
        }
    }
}

/// Observer sync-state check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncCheckConfig {
    /// Poll `/node/status` of every observer (off = every node counts as synced)
    pub enabled: bool,
    /// Period between two checks; transport errors bring the next one forward
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Timeout of one status call
    #[serde(with = "humantime_serde")]
    pub status_timeout: Duration,
    /// A node this many blocks behind its probable highest nonce is out of sync
    pub nonce_threshold: u64,
}

impl Default for SyncCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            status_timeout: Duration::from_secs(2),
            nonce_threshold: 10,
        }
    }
}

/// Admin server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bind address (localhost only by default)
    pub host: IpAddr,
    /// Port (default: 8079)
    pub port: u16,
    /// Enable admin server
    pub enabled: bool,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8079,
            enabled: true,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Cannot read config: {0}")]
    Io(String),
    /// Config text is not valid TOML for this schema
    #[error("Cannot parse config: {0}")]
    Parse(String),
    /// Shard layout is inconsistent
    #[error("Invalid shard configuration: {0}")]
    InvalidShards(String),
    /// Limit out of range
    #[error("Invalid limit: {0}")]
    InvalidLimit(String),
    /// Timeout out of range
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),
    /// No regular observer configured
    #[error("No observers configured")]
    NoObservers,
}

/// Duration (de)serialization accepting `500ms`, `10s`, `2m` or plain seconds.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
