use rand::Rng;
use std::time::{Duration, Instant};

/// Draws a random election timeout from `[min_ms, max_ms)`.
pub fn random_election_timeout(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    let mut rng = rand::rng();
    Duration::from_millis(rng.random_range(min_ms..max_ms))
}

/// Deadline after which a follower or candidate starts a new election.
#[derive(Debug, Clone)]
pub struct ElectionTimer {
    min_ms: u64,
    max_ms: u64,
    deadline: Instant,
}

impl ElectionTimer {
    pub fn new(min_ms: u64, max_ms: u64, now: Instant) -> Self {
        Self {
            min_ms,
            max_ms,
            deadline: now + random_election_timeout(min_ms, max_ms),
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.deadline = now + random_election_timeout(self.min_ms, self.max_ms);
    }

    pub fn expired(&self, now: Instant) -> bool {
        now > self.deadline
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}
