use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use leader_elect::raft::{NodeRole, Outbound, RaftMessage, RaftNode};
use leader_elect::ClusterConfig;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Event {
    Deliver(RaftMessage),
    Advance { ms: u64 },
}

fn message_strategy() -> impl Strategy<Value = RaftMessage> {
    prop_oneof![
        (0u64..6, 0u64..5).prop_map(|(term, candidate_id)| RaftMessage::RequestVote {
            term,
            candidate_id
        }),
        (0u64..6, any::<bool>()).prop_map(|(term, vote_granted)| RaftMessage::VoteResponse {
            term,
            vote_granted
        }),
        (0u64..6, 0u64..5).prop_map(|(term, leader_id)| RaftMessage::Heartbeat { term, leader_id }),
    ]
}

fn event_strategy() -> impl Strategy<Value = Event> {
    prop_oneof![
        3 => message_strategy().prop_map(Event::Deliver),
        1 => (0u64..4000).prop_map(|ms| Event::Advance { ms }),
    ]
}

proptest! {
    #[test]
    fn term_never_decreases_and_one_candidate_per_term(
        events in proptest::collection::vec(event_strategy(), 1..80)
    ) {
        let config = ClusterConfig::default();
        let mut now = Instant::now();
        let mut node = RaftNode::new(config.raft_config(0), now);

        let mut last_term = node.current_term();
        let mut granted: BTreeMap<u64, BTreeSet<u64>> = BTreeMap::new();

        for event in events {
            match event {
                Event::Deliver(message) => {
                    let out = node.handle_message(message, now);
                    if let RaftMessage::RequestVote { term, candidate_id } = message {
                        let reply = Outbound::Reply(RaftMessage::VoteResponse {
                            term,
                            vote_granted: true,
                        });
                        if out.contains(&reply) {
                            granted.entry(term).or_default().insert(candidate_id);
                        }
                    }
                }
                Event::Advance { ms } => {
                    now += Duration::from_millis(ms);
                    let out = node.tick(now);
                    if node.role() == NodeRole::Candidate && !out.is_empty() {
                        // The node's own vote counts as a grant in its new term.
                        granted.entry(node.current_term()).or_default().insert(node.id());
                    }
                }
            }

            prop_assert!(node.current_term() >= last_term);
            last_term = node.current_term();

            if let Some(record) = node.state().voted_for {
                prop_assert!(record.term <= node.current_term());
            }
            if node.is_leader() {
                prop_assert!(node.votes_received() >= node.majority());
            }
        }

        for (term, candidates) in &granted {
            prop_assert!(
                candidates.len() <= 1,
                "term {} granted to {:?}",
                term,
                candidates
            );
        }
    }
}
