use rand::seq::index;
use rand::Rng;
use std::collections::VecDeque;

/// One `(state, action, reward, next_state, done)` transition.
#[derive(Clone, Debug, PartialEq)]
pub struct Experience {
    pub state: Vec<f32>,
    pub action: usize,
    pub reward: f32,
    pub next_state: Vec<f32>,
    pub done: bool,
}

/// Bounded FIFO of experiences; the oldest entry is evicted once full.
#[derive(Clone, Debug)]
pub struct ReplayBuffer {
    capacity: usize,
    entries: VecDeque<Experience>,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "replay capacity must be positive");
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1 << 16)),
        }
    }

    pub fn push(&mut self, experience: Experience) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(experience);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `amount` distinct entries chosen uniformly, or `None` when fewer are stored.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, amount: usize) -> Option<Vec<&Experience>> {
        if amount > self.entries.len() {
            return None;
        }
        Some(
            index::sample(rng, self.entries.len(), amount)
                .into_iter()
                .map(|i| &self.entries[i])
                .collect(),
        )
    }
}
