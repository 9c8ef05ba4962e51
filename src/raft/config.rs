use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use super::NodeId;

#[derive(Debug, Clone)]
pub struct RaftConfig {
    pub node_id: NodeId,
    pub bind_addr: SocketAddr,
    pub peers: BTreeMap<NodeId, SocketAddr>, // node_id -> address
    pub election_timeout_min: u64,           // in milliseconds
    pub election_timeout_max: u64,           // in milliseconds
    pub heartbeat_interval: u64,             // in milliseconds
    pub tick_interval: u64,                  // in milliseconds
}

impl RaftConfig {
    pub fn new(node_id: NodeId, bind_addr: SocketAddr) -> Self {
        Self {
            node_id,
            bind_addr,
            peers: BTreeMap::new(),
            election_timeout_min: 1500,
            election_timeout_max: 3000,
            heartbeat_interval: 500,
            tick_interval: 50,
        }
    }

    pub fn add_peer(&mut self, peer_id: NodeId, address: SocketAddr) {
        if peer_id != self.node_id {
            self.peers.insert(peer_id, address);
        }
    }

    /// Quorum size counting this node: `(peers + 1) / 2 + 1`.
    pub fn majority(&self) -> usize {
        self.peers.len().div_ceil(2) + 1
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval)
    }
}
