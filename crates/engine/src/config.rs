//! Node configuration via `geostore.toml`
//!
//! A config file lives in the node's data directory. On first start a
//! commented default is written; to change settings, edit the file and
//! restart the node.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use geostore_core::{GeoError, GeoResult};
use geostore_durability::DurabilityMode;
use serde::{Deserialize, Serialize};

/// Whether this node originates mutations or only applies replicated ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Accepts insert/replace/delete and streams them to peers
    #[default]
    Leader,
    /// Rejects local mutations; applies transactions received from the leader
    Follower,
}

impl Role {
    /// Config-file spelling of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Leader => "leader",
            Role::Follower => "follower",
        }
    }

    /// True for the leader role
    pub fn is_leader(&self) -> bool {
        matches!(self, Role::Leader)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A follower the leader streams transactions to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Peer node name, used in logs
    pub name: String,
    /// `host:port` the peer accepts replication connections on
    pub addr: String,
}

/// `[replication]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Address this node accepts replication connections on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<SocketAddr>,
    /// Peers the leader dials
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    /// Dial timeout
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Per-frame write timeout
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Delay before redialing a disconnected peer
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    /// Transactions buffered per peer before the peer is dropped
    #[serde(default = "default_peer_queue_capacity")]
    pub peer_queue_capacity: usize,
    /// Recent transactions re-sent to a peer each time it reconnects
    #[serde(default = "default_backlog_capacity")]
    pub backlog_capacity: usize,
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_write_timeout_ms() -> u64 {
    2000
}

fn default_reconnect_backoff_ms() -> u64 {
    1000
}

fn default_peer_queue_capacity() -> usize {
    1024
}

fn default_backlog_capacity() -> usize {
    1024
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            listen: None,
            peers: Vec::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            peer_queue_capacity: default_peer_queue_capacity(),
            backlog_capacity: default_backlog_capacity(),
        }
    }
}

impl ReplicationConfig {
    /// Dial timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Write timeout as a `Duration`
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Reconnect backoff as a `Duration`
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

/// Node configuration loaded from `geostore.toml`.
///
/// # Example
///
/// ```toml
/// node = "storage1"
/// role = "leader"
/// durability = "standard"
/// checkpoint_interval_ms = 60000
///
/// [replication]
/// listen = "0.0.0.0:7400"
/// peers = [{ name = "storage2", addr = "10.0.0.2:7400" }]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name; the origin recorded on every locally issued transaction
    pub node: String,
    /// `"leader"` or `"follower"`
    #[serde(default)]
    pub role: Role,
    /// Durability mode: `"standard"` or `"always"`
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Interval between automatic checkpoints; 0 disables them
    #[serde(default = "default_checkpoint_interval_ms")]
    pub checkpoint_interval_ms: u64,
    /// Replication settings
    #[serde(default)]
    pub replication: ReplicationConfig,
}

fn default_durability_str() -> String {
    "standard".to_string()
}

fn default_checkpoint_interval_ms() -> u64 {
    60_000
}

impl NodeConfig {
    /// Minimal config for a node with no peers.
    pub fn new(node: impl Into<String>, role: Role) -> Self {
        Self {
            node: node.into(),
            role,
            durability: default_durability_str(),
            checkpoint_interval_ms: default_checkpoint_interval_ms(),
            replication: ReplicationConfig::default(),
        }
    }

    /// Parse the durability string into a `DurabilityMode`.
    pub fn durability_mode(&self) -> GeoResult<DurabilityMode> {
        self.durability.parse().map_err(GeoError::invalid_config)
    }

    /// Periodic checkpoint interval, `None` if disabled.
    pub fn checkpoint_interval(&self) -> Option<Duration> {
        match self.checkpoint_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Reject values that parse but cannot be used.
    pub fn validate(&self) -> GeoResult<()> {
        if self.node.trim().is_empty() {
            return Err(GeoError::invalid_config("node name must not be empty"));
        }
        self.durability_mode()?;

        let repl = &self.replication;
        if let Some(peer) = repl.peers.iter().find(|p| p.name.is_empty() || p.addr.is_empty()) {
            return Err(GeoError::invalid_config(format!(
                "peer entry {:?} needs both a name and an addr",
                peer
            )));
        }
        if repl.peer_queue_capacity == 0 {
            return Err(GeoError::invalid_config("peer_queue_capacity must be at least 1"));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# geostore node configuration
#
# Name recorded as the origin of every transaction this node issues.
node = "node1"

# "leader" accepts insert/replace/delete and streams them to peers.
# "follower" rejects local mutations and applies what the leader sends.
role = "leader"

# Durability mode: "standard" (default) or "always"
#   "standard" = flush each log append to the OS
#   "always"   = fsync each log append, zero data loss
durability = "standard"

# Automatic checkpoint interval in milliseconds (0 disables).
checkpoint_interval_ms = 60000

[replication]
# Address to accept replication connections on (followers).
# listen = "0.0.0.0:7400"

# Followers the leader streams to.
# peers = [
#   { name = "node2", addr = "127.0.0.1:7401" },
# ]

# connect_timeout_ms = 2000
# write_timeout_ms = 2000
# reconnect_backoff_ms = 1000
# peer_queue_capacity = 1024
# backlog_capacity = 1024
"#
    }

    /// Read, parse and validate config from a file path.
    pub fn from_file(path: &Path) -> GeoResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GeoError::invalid_config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_toml(&content).map_err(|e| match e {
            GeoError::InvalidConfig { reason } => GeoError::invalid_config(format!(
                "{} ({})",
                reason,
                path.display()
            )),
            other => other,
        })?;
        Ok(config)
    }

    /// Parse and validate config text.
    pub fn from_toml(content: &str) -> GeoResult<Self> {
        let config: NodeConfig = toml::from_str(content)
            .map_err(|e| GeoError::invalid_config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> GeoResult<()> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> GeoResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GeoError::invalid_config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
