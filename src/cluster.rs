use std::time::Duration;

use log::{error, info};
use tokio::time::{sleep, Instant};

use crate::config::ClusterConfig;
use crate::raft::{NodeHandle, NodeStatus, Raft, RaftError};

/// Composition root: starts one task per node and stops them again.
pub struct Cluster {
    nodes: Vec<NodeHandle>,
}

impl Cluster {
    /// Starts every node of `config`. If any node fails to bind, the nodes
    /// already started are shut down and the bind error is returned.
    pub async fn start(config: &ClusterConfig) -> Result<Self, RaftError> {
        config.validate()?;

        let mut nodes = Vec::new();

        for id in config.node_ids() {
            match Raft::start(config.raft_config(id)).await {
                Ok(handle) => nodes.push(handle),
                Err(e) => {
                    error!("Node {id} failed to start: {e}");
                    if let Err(stop_err) = (Cluster { nodes }).shutdown().await {
                        error!("Rolling back started nodes failed: {stop_err}");
                    }
                    return Err(e);
                }
            }
        }

        info!("Started cluster of {} nodes", nodes.len());
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    /// Statuses of the nodes that are still running. A stopped node's last
    /// snapshot is left out so it is never reported as leader.
    pub fn statuses(&self) -> Vec<NodeStatus> {
        self.nodes
            .iter()
            .filter(|node| node.is_running())
            .map(NodeHandle::status)
            .collect()
    }

    /// The leader at the highest term any running node has reached, provided
    /// exactly one node claims leadership in that term.
    pub fn leader(&self) -> Option<NodeStatus> {
        let statuses = self.statuses();
        let top_term = statuses.iter().map(|s| s.term).max()?;
        let mut leaders = statuses
            .into_iter()
            .filter(|s| s.is_leader() && s.term == top_term);

        match (leaders.next(), leaders.next()) {
            (Some(leader), None) => Some(leader),
            _ => None,
        }
    }

    /// Polls until [`Cluster::leader`] reports a leader or `timeout` passes.
    pub async fn wait_for_leader(&self, timeout: Duration) -> Option<NodeStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(leader) = self.leader() {
                return Some(leader);
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }

    /// Runs for `duration`, then stops every node.
    pub async fn run_for(self, duration: Duration) -> Result<Vec<NodeStatus>, RaftError> {
        sleep(duration).await;
        let statuses = self.statuses();
        self.shutdown().await?;
        Ok(statuses)
    }

    /// Signals every node to stop, then waits for all of them.
    pub async fn shutdown(self) -> Result<(), RaftError> {
        for node in &self.nodes {
            node.stop();
        }

        let mut first_err = None;
        for node in self.nodes {
            let id = node.id();
            if let Err(e) = node.join().await {
                error!("Node {id} did not stop cleanly: {e}");
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => {
                info!("Cluster stopped");
                Ok(())
            }
        }
    }
}
