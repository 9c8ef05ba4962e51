// Election core
pub mod raft;

// Cluster lifecycle and configuration
pub mod cluster;
pub mod config;

// Log output
pub mod logging;

// Public exports
pub use cluster::Cluster;
pub use config::{ClusterConfig, ConfigError};
pub use raft::{NodeHandle, NodeRole, NodeStatus, Raft, RaftConfig, RaftError};
