use std::time::Instant;

use log::{debug, info};

use super::timer::ElectionTimer;
use super::{NodeId, NodeRole, NodeState, NodeStatus, RaftConfig, RaftMessage, VoteRecord};

/// A message produced by the state machine, addressed either to every peer
/// or back to the sender of the message being handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Broadcast(RaftMessage),
    Reply(RaftMessage),
}

/// Election state machine for one node.
///
/// Holds no sockets and never reads the clock itself: every entry point
/// takes `now`, so the same node can be driven by the UDP task loop or by a
/// simulated clock in tests.
pub struct RaftNode {
    // Node identity
    id: NodeId,

    // Raft state
    state: NodeState,

    // Configuration
    config: RaftConfig,
    majority: usize,

    // Election state
    timer: ElectionTimer,
    votes_received: usize,

    // Leader state
    last_heartbeat: Instant,
}

impl RaftNode {
    pub fn new(config: RaftConfig, now: Instant) -> Self {
        Self {
            id: config.node_id,
            state: NodeState::default(),
            majority: config.majority(),
            timer: ElectionTimer::new(
                config.election_timeout_min,
                config.election_timeout_max,
                now,
            ),
            votes_received: 0,
            last_heartbeat: now,
            config,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &RaftConfig {
        &self.config
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn current_term(&self) -> u64 {
        self.state.current_term
    }

    pub fn role(&self) -> NodeRole {
        self.state.role
    }

    pub fn is_leader(&self) -> bool {
        matches!(self.state.role, NodeRole::Leader)
    }

    pub fn majority(&self) -> usize {
        self.majority
    }

    pub fn votes_received(&self) -> usize {
        self.votes_received
    }

    pub fn election_deadline(&self) -> Instant {
        self.timer.deadline()
    }

    pub fn last_heartbeat(&self) -> Instant {
        self.last_heartbeat
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            id: self.id,
            term: self.state.current_term,
            role: self.state.role,
            leader_id: self.state.leader_id,
        }
    }

    /// Timer-driven work for one tick: leader heartbeats, then the election
    /// timeout check for followers and candidates.
    pub fn tick(&mut self, now: Instant) -> Vec<Outbound> {
        match self.state.role {
            NodeRole::Leader => {
                if now.duration_since(self.last_heartbeat) > self.config.heartbeat_interval() {
                    self.last_heartbeat = now;
                    vec![Outbound::Broadcast(self.heartbeat())]
                } else {
                    Vec::new()
                }
            }
            NodeRole::Follower | NodeRole::Candidate => {
                if self.timer.expired(now) {
                    self.start_election(now)
                } else {
                    Vec::new()
                }
            }
        }
    }

    pub fn start_election(&mut self, now: Instant) -> Vec<Outbound> {
        self.state.current_term += 1;
        self.state.role = NodeRole::Candidate;
        self.state.leader_id = None;
        self.state.voted_for = Some(VoteRecord {
            term: self.state.current_term,
            candidate_id: self.id,
        });
        self.votes_received = 1;
        self.timer.reset(now);

        info!(
            "Node {}: starting election for term {}",
            self.id, self.state.current_term
        );

        let mut out = vec![Outbound::Broadcast(RaftMessage::RequestVote {
            term: self.state.current_term,
            candidate_id: self.id,
        })];

        // A node without peers already holds a majority of one.
        if self.votes_received >= self.majority {
            out.extend(self.become_leader(now));
        }

        out
    }

    /// Any message carrying a newer term demotes this node before the
    /// message itself is handled.
    pub fn handle_message(&mut self, message: RaftMessage, now: Instant) -> Vec<Outbound> {
        self.observe_term(message.term());

        match message {
            RaftMessage::RequestVote { term, candidate_id } => {
                vec![self.handle_request_vote(term, candidate_id)]
            }
            RaftMessage::VoteResponse { term, vote_granted } => {
                self.handle_vote_response(term, vote_granted, now)
            }
            RaftMessage::Heartbeat { term, leader_id } => {
                self.handle_heartbeat(term, leader_id, now);
                Vec::new()
            }
        }
    }

    fn observe_term(&mut self, term: u64) {
        if term > self.state.current_term {
            if self.state.role != NodeRole::Follower {
                info!(
                    "Node {}: saw term {} (was {} in term {}), stepping down",
                    self.id, term, self.state.role, self.state.current_term
                );
            }
            self.state.current_term = term;
            self.state.role = NodeRole::Follower;
            self.state.voted_for = None;
            self.state.leader_id = None;
        }
    }

    fn handle_request_vote(&mut self, term: u64, candidate_id: NodeId) -> Outbound {
        let vote_granted = term == self.state.current_term
            && match self.state.voted_for {
                Some(record) if record.term == term => record.candidate_id == candidate_id,
                _ => true,
            };

        if vote_granted {
            self.state.voted_for = Some(VoteRecord { term, candidate_id });
            debug!(
                "Node {}: voted for node {} in term {}",
                self.id, candidate_id, term
            );
        }

        Outbound::Reply(RaftMessage::VoteResponse {
            term: self.state.current_term,
            vote_granted,
        })
    }

    fn handle_vote_response(
        &mut self,
        term: u64,
        vote_granted: bool,
        now: Instant,
    ) -> Vec<Outbound> {
        if self.state.role != NodeRole::Candidate
            || term != self.state.current_term
            || !vote_granted
        {
            return Vec::new();
        }

        // Grants are not tracked per voter, so a duplicated datagram counts twice.
        self.votes_received += 1;
        debug!(
            "Node {}: received vote, total votes = {}",
            self.id, self.votes_received
        );

        if self.votes_received >= self.majority {
            self.become_leader(now)
        } else {
            Vec::new()
        }
    }

    fn handle_heartbeat(&mut self, term: u64, leader_id: NodeId, now: Instant) {
        if term >= self.state.current_term {
            self.state.leader_id = Some(leader_id);
            self.last_heartbeat = now;
            self.timer.reset(now);
        }
    }

    fn become_leader(&mut self, now: Instant) -> Vec<Outbound> {
        if self.state.role != NodeRole::Candidate {
            return Vec::new();
        }

        info!(
            "Node {}: received {} of {} votes, becoming LEADER for term {}",
            self.id, self.votes_received, self.majority, self.state.current_term
        );

        self.state.role = NodeRole::Leader;
        self.state.leader_id = Some(self.id);
        self.last_heartbeat = now;

        vec![Outbound::Broadcast(self.heartbeat())]
    }

    fn heartbeat(&self) -> RaftMessage {
        RaftMessage::Heartbeat {
            term: self.state.current_term,
            leader_id: self.id,
        }
    }
}
