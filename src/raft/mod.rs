mod config;
mod error;
mod node;
mod state;
mod timer;
mod transport;

pub use self::config::RaftConfig;
pub use self::error::RaftError;
pub use self::node::{Outbound, RaftNode};
pub use self::state::{NodeId, NodeRole, NodeState, NodeStatus, VoteRecord};
pub use self::timer::{random_election_timeout, ElectionTimer};
pub use self::transport::UdpTransport;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

// Election messages, one JSON object per datagram, e.g.
// {"type":"REQUEST_VOTE","term":1,"candidate_id":2}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RaftMessage {
    RequestVote { term: u64, candidate_id: NodeId },
    VoteResponse { term: u64, vote_granted: bool },
    Heartbeat { term: u64, leader_id: NodeId },
}

impl RaftMessage {
    pub fn term(&self) -> u64 {
        match self {
            RaftMessage::RequestVote { term, .. }
            | RaftMessage::VoteResponse { term, .. }
            | RaftMessage::Heartbeat { term, .. } => *term,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, RaftError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RaftError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// The task loop that owns one node: its state machine and its socket.
pub struct Raft {
    node: RaftNode,
    transport: UdpTransport,
    running: Arc<AtomicBool>,
    status: watch::Sender<NodeStatus>,
}

impl Raft {
    /// Binds the node's socket and spawns its poll loop.
    ///
    /// A bind failure is returned before anything is spawned.
    pub async fn start(config: RaftConfig) -> Result<NodeHandle, RaftError> {
        let transport = UdpTransport::bind(config.bind_addr, config.peers.clone()).await?;
        let addr = transport.local_addr()?;

        let node = RaftNode::new(config, Instant::now());
        let id = node.id();
        let (status_tx, status_rx) = watch::channel(node.status());
        let running = Arc::new(AtomicBool::new(true));

        info!("Node {id} started as {} on {addr}", node.role());

        let raft = Raft {
            node,
            transport,
            running: Arc::clone(&running),
            status: status_tx,
        };
        let task = tokio::spawn(raft.run());

        Ok(NodeHandle {
            id,
            addr,
            status: status_rx,
            running,
            task,
        })
    }

    async fn run(mut self) {
        let tick = self.node.config().tick_interval();

        while self.running.load(Ordering::Acquire) {
            self.poll_once().await;
            sleep(tick).await;
        }

        info!(
            "Node {} stopped as {} in term {}",
            self.node.id(),
            self.node.role(),
            self.node.current_term()
        );
        // Dropping self closes the socket.
    }

    async fn poll_once(&mut self) {
        while let Some((message, from)) = self.transport.try_recv() {
            let out = self.node.handle_message(message, Instant::now());
            self.dispatch(out, Some(from)).await;
        }

        let out = self.node.tick(Instant::now());
        self.dispatch(out, None).await;

        let status = self.node.status();
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    async fn dispatch(&self, out: Vec<Outbound>, reply_to: Option<SocketAddr>) {
        for outbound in out {
            match outbound {
                Outbound::Broadcast(message) => self.transport.broadcast(&message).await,
                Outbound::Reply(message) => {
                    if let Some(addr) = reply_to {
                        self.transport.send_to(addr, &message).await;
                    }
                }
            }
        }
    }
}

/// Handle to a running node task.
pub struct NodeHandle {
    id: NodeId,
    addr: SocketAddr,
    status: watch::Receiver<NodeStatus>,
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl NodeHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Latest status published by the node's task.
    pub fn status(&self) -> NodeStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<NodeStatus> {
        self.status.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.task.is_finished()
    }

    /// Asks the node to exit; it notices on its next tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub async fn join(self) -> Result<(), RaftError> {
        self.task
            .await
            .map_err(|e| RaftError::TaskFailed(e.to_string()))
    }

    pub async fn shutdown(self) -> Result<(), RaftError> {
        self.stop();
        self.join().await
    }
}
