use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::raft::{NodeId, RaftConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for a whole cluster. Node `i` listens on `host:(base_port + i)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub node_count: u64,
    pub host: IpAddr,
    pub base_port: u16,
    pub heartbeat_interval_ms: u64,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub tick_interval_ms: u64,
    /// How long the cluster driver runs before stopping; `None` runs until
    /// interrupted.
    pub run_duration_secs: Option<u64>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_count: 5,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: 5000,
            heartbeat_interval_ms: 500,
            election_timeout_min_ms: 1500,
            election_timeout_max_ms: 3000,
            tick_interval_ms: 50,
            run_duration_secs: Some(10),
        }
    }
}

impl ClusterConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: ClusterConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_count == 0 {
            return Err(ConfigError::Invalid("node_count must be at least 1".into()));
        }
        let last_port = u64::from(self.base_port).saturating_add(self.node_count - 1);
        if last_port > u64::from(u16::MAX) {
            return Err(ConfigError::Invalid(format!(
                "base_port {} with {} nodes runs past port 65535",
                self.base_port, self.node_count
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be positive".into()));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_ms must be positive".into(),
            ));
        }
        if self.election_timeout_min_ms >= self.election_timeout_max_ms {
            return Err(ConfigError::Invalid(format!(
                "election timeout range [{}, {}) is empty",
                self.election_timeout_min_ms, self.election_timeout_max_ms
            )));
        }
        if self.election_timeout_min_ms <= self.heartbeat_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "election_timeout_min_ms ({}) must exceed heartbeat_interval_ms ({})",
                self.election_timeout_min_ms, self.heartbeat_interval_ms
            )));
        }
        Ok(())
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        0..self.node_count
    }

    /// Endpoint of node `id`. Callers validate first so the port fits.
    pub fn node_addr(&self, id: NodeId) -> SocketAddr {
        let port = u64::from(self.base_port).saturating_add(id);
        SocketAddr::new(self.host, u16::try_from(port).unwrap_or(u16::MAX))
    }

    pub fn run_duration(&self) -> Option<Duration> {
        self.run_duration_secs.map(Duration::from_secs)
    }

    /// Per-node settings with every other node as a peer.
    pub fn raft_config(&self, id: NodeId) -> RaftConfig {
        let mut config = RaftConfig::new(id, self.node_addr(id));
        for peer in self.node_ids().filter(|peer| *peer != id) {
            config.add_peer(peer, self.node_addr(peer));
        }
        config.election_timeout_min = self.election_timeout_min_ms;
        config.election_timeout_max = self.election_timeout_max_ms;
        config.heartbeat_interval = self.heartbeat_interval_ms;
        config.tick_interval = self.tick_interval_ms;
        config
    }
}
