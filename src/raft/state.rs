use std::fmt;

use serde::{Deserialize, Serialize};

pub type NodeId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Follower,
    Candidate,
    Leader,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Follower => write!(f, "FOLLOWER"),
            NodeRole::Candidate => write!(f, "CANDIDATE"),
            NodeRole::Leader => write!(f, "LEADER"),
        }
    }
}

/// The candidate this node voted for, and in which term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub term: u64,
    pub candidate_id: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeState {
    pub current_term: u64,
    pub voted_for: Option<VoteRecord>,
    pub role: NodeRole,
    pub leader_id: Option<NodeId>,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            current_term: 0,
            voted_for: None,
            role: NodeRole::Follower,
            leader_id: None,
        }
    }
}

/// Read-only view of a node, published by its task after every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: NodeId,
    pub term: u64,
    pub role: NodeRole,
    pub leader_id: Option<NodeId>,
}

impl NodeStatus {
    pub fn is_leader(&self) -> bool {
        self.role == NodeRole::Leader
    }
}
