//! Drives several `RaftNode`s against a simulated clock and an in-memory
//! network, so election scenarios run tick by tick without sockets.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use leader_elect::raft::{NodeId, NodeRole, Outbound, RaftMessage, RaftNode, VoteRecord};
use leader_elect::ClusterConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

struct Sim {
    config: ClusterConfig,
    nodes: Vec<RaftNode>,
    inbox: Vec<VecDeque<(RaftMessage, NodeId)>>,
    crashed: Vec<bool>,
    sent: Vec<(NodeId, Outbound)>,
    last_terms: Vec<u64>,
    loss: Option<(StdRng, f64)>,
    now: Instant,
}

impl Sim {
    fn new(node_count: u64) -> Self {
        let config = ClusterConfig {
            node_count,
            ..ClusterConfig::default()
        };
        let now = Instant::now();
        let nodes: Vec<RaftNode> = config
            .node_ids()
            .map(|id| RaftNode::new(config.raft_config(id), now))
            .collect();
        let n = nodes.len();

        Self {
            config,
            nodes,
            inbox: vec![VecDeque::new(); n],
            crashed: vec![false; n],
            sent: Vec::new(),
            last_terms: vec![0; n],
            loss: None,
            now,
        }
    }

    fn with_loss(mut self, seed: u64, rate: f64) -> Self {
        self.loss = Some((StdRng::seed_from_u64(seed), rate));
        self
    }

    fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.config.tick_interval_ms)
    }

    fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.config.heartbeat_interval_ms)
    }

    fn dropped(&mut self) -> bool {
        match &mut self.loss {
            Some((rng, rate)) => rng.random_bool(*rate),
            None => false,
        }
    }

    fn route(&mut self, from: NodeId, out: Vec<Outbound>, reply_to: Option<NodeId>) {
        for outbound in out {
            match &outbound {
                Outbound::Broadcast(message) => {
                    for to in 0..self.nodes.len() {
                        if to as NodeId != from && !self.dropped() {
                            self.inbox[to].push_back((*message, from));
                        }
                    }
                }
                Outbound::Reply(message) => {
                    if let Some(to) = reply_to {
                        if !self.dropped() {
                            self.inbox[to as usize].push_back((*message, from));
                        }
                    }
                }
            }
            self.sent.push((from, outbound));
        }
    }

    fn drain(&mut self, id: usize) {
        while let Some((message, from)) = self.inbox[id].pop_front() {
            if self.crashed[id] {
                continue;
            }
            let out = self.nodes[id].handle_message(message, self.now);
            self.route(id as NodeId, out, Some(from));
        }
    }

    /// Delivers queued messages without advancing time or firing timers.
    fn flush(&mut self) {
        while self.inbox.iter().any(|q| !q.is_empty()) {
            for id in 0..self.nodes.len() {
                self.drain(id);
            }
        }
        self.check_terms();
    }

    /// One tick of every live node: drain inbox, then timers.
    fn step(&mut self) {
        self.now += self.tick_interval();
        for id in 0..self.nodes.len() {
            if self.crashed[id] {
                self.inbox[id].clear();
                continue;
            }
            self.drain(id);
            let out = self.nodes[id].tick(self.now);
            self.route(id as NodeId, out, None);
        }
        self.check_terms();
    }

    fn run_for(&mut self, duration: Duration) {
        let end = self.now + duration;
        while self.now < end {
            self.step();
        }
    }

    fn check_terms(&mut self) {
        for (id, node) in self.nodes.iter().enumerate() {
            assert!(
                node.current_term() >= self.last_terms[id],
                "node {id} term went from {} to {}",
                self.last_terms[id],
                node.current_term()
            );
            self.last_terms[id] = node.current_term();
        }
    }

    fn live(&self) -> impl Iterator<Item = &RaftNode> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(id, _)| !self.crashed[*id])
            .map(|(_, node)| node)
    }

    /// The single live leader, if every other live node follows it in the
    /// same term.
    fn settled_leader(&self) -> Option<(NodeId, u64)> {
        let mut leaders = self.live().filter(|n| n.is_leader());
        let leader = leaders.next()?;
        if leaders.next().is_some() {
            return None;
        }
        let term = leader.current_term();
        let all_follow = self.live().filter(|n| !n.is_leader()).all(|n| {
            n.role() == NodeRole::Follower
                && n.current_term() == term
                && n.state().leader_id == Some(leader.id())
        });
        all_follow.then_some((leader.id(), term))
    }

    fn run_until_settled(&mut self, limit: Duration) -> (NodeId, u64) {
        let end = self.now + limit;
        while self.now < end {
            self.step();
            if let Some(settled) = self.settled_leader() {
                return settled;
            }
        }
        panic!("no settled leader after {limit:?} of simulated time");
    }
}

#[test]
fn five_node_cluster_elects_first_candidate() {
    let mut sim = Sim::new(5);
    assert!(sim.nodes.iter().all(|n| n.majority() == 3));

    let now = sim.now;
    let out = sim.nodes[2].start_election(now);
    sim.route(2, out, None);
    assert_eq!(sim.nodes[2].role(), NodeRole::Candidate);
    assert_eq!(sim.nodes[2].current_term(), 1);

    sim.flush();

    assert!(sim.nodes[2].is_leader());
    assert_eq!(sim.nodes[2].current_term(), 1);
    for id in [0usize, 1, 3, 4] {
        let node = &sim.nodes[id];
        assert_eq!(node.role(), NodeRole::Follower);
        assert_eq!(node.current_term(), 1);
        assert_eq!(
            node.state().voted_for,
            Some(VoteRecord {
                term: 1,
                candidate_id: 2
            })
        );
        assert_eq!(node.state().leader_id, Some(2));
    }

    let heartbeats: Vec<_> = sim
        .sent
        .iter()
        .filter(|(from, out)| {
            *from == 2
                && *out
                    == Outbound::Broadcast(RaftMessage::Heartbeat {
                        term: 1,
                        leader_id: 2,
                    })
        })
        .collect();
    assert_eq!(heartbeats.len(), 1, "leader announces itself once on winning");

    sim.sent.clear();
    let interval = sim.heartbeat_interval() + sim.tick_interval();
    sim.run_for(interval);
    assert!(sim.sent.iter().any(|(from, out)| {
        *from == 2 && matches!(out, Outbound::Broadcast(RaftMessage::Heartbeat { term: 1, leader_id: 2 }))
    }));
    assert_eq!(sim.settled_leader(), Some((2, 1)));
}

#[test]
fn cold_start_converges_on_one_leader() {
    let mut sim = Sim::new(5);
    let (leader, term) = sim.run_until_settled(Duration::from_secs(60));

    // Stable within a heartbeat interval and long after.
    let interval = sim.heartbeat_interval() + sim.tick_interval() * 2;
    sim.run_for(interval);
    assert_eq!(sim.settled_leader(), Some((leader, term)));

    sim.run_for(Duration::from_secs(30));
    assert_eq!(sim.settled_leader(), Some((leader, term)));
}

#[test]
fn split_vote_is_retried_in_a_higher_term() {
    let mut sim = Sim::new(4);
    assert_eq!(sim.nodes[0].majority(), 3);
    let now = sim.now;

    sim.nodes[0].start_election(now);
    sim.nodes[1].start_election(now);

    let request = |candidate_id| RaftMessage::RequestVote {
        term: 1,
        candidate_id,
    };
    let granted = |out: Vec<Outbound>| {
        out == vec![Outbound::Reply(RaftMessage::VoteResponse {
            term: 1,
            vote_granted: true,
        })]
    };

    // Node 2 hears from 0 first, node 3 from 1 first.
    assert!(granted(sim.nodes[2].handle_message(request(0), now)));
    assert!(granted(sim.nodes[3].handle_message(request(1), now)));
    assert!(!granted(sim.nodes[2].handle_message(request(1), now)));
    assert!(!granted(sim.nodes[3].handle_message(request(0), now)));
    assert!(!granted(sim.nodes[0].handle_message(request(1), now)));
    assert!(!granted(sim.nodes[1].handle_message(request(0), now)));

    let grant = RaftMessage::VoteResponse {
        term: 1,
        vote_granted: true,
    };
    sim.nodes[0].handle_message(grant, now);
    sim.nodes[1].handle_message(grant, now);

    for id in [0usize, 1] {
        assert_eq!(sim.nodes[id].role(), NodeRole::Candidate);
        assert_eq!(sim.nodes[id].votes_received(), 2);
    }
    sim.check_terms();

    let (_, term) = sim.run_until_settled(Duration::from_secs(120));
    assert!(term >= 2, "split term 1 cannot produce a leader, got term {term}");
}

#[test]
fn survivors_replace_a_crashed_leader() {
    let mut sim = Sim::new(5);
    let (old_leader, old_term) = sim.run_until_settled(Duration::from_secs(60));

    sim.crashed[old_leader as usize] = true;
    let (new_leader, new_term) = sim.run_until_settled(Duration::from_secs(60));

    assert_ne!(new_leader, old_leader);
    assert!(new_term > old_term);
}

#[test]
fn minority_cannot_elect_a_leader() {
    let mut sim = Sim::new(5);
    for id in [0usize, 1, 2] {
        sim.crashed[id] = true;
    }

    sim.run_for(Duration::from_secs(30));
    assert!(sim.live().all(|n| !n.is_leader()));
    assert!(sim.live().all(|n| n.current_term() > 0));
}

#[test]
fn lossy_network_still_elects_a_leader() {
    let mut sim = Sim::new(5).with_loss(7, 0.1);
    let end = sim.now + Duration::from_secs(120);

    let mut found = false;
    while sim.now < end {
        sim.step();
        let top = sim.nodes.iter().map(|n| n.current_term()).max().unwrap_or(0);
        let leaders = sim
            .nodes
            .iter()
            .filter(|n| n.is_leader() && n.current_term() == top)
            .count();
        if leaders == 1 {
            found = true;
            break;
        }
    }
    assert!(found, "no leader elected under 10% message loss");
}
