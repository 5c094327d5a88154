use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::agent::Policy;
use crate::game::Action;

/// An agent that selects uniformly at random from legal actions.
#[derive(Debug, Clone)]
pub struct RandomAgent {
    rng: StdRng,
}

impl RandomAgent {
    pub fn new() -> Self {
        RandomAgent {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible opponent, used for seeded evaluation.
    pub fn seeded(seed: u64) -> Self {
        RandomAgent {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Policy<S> for RandomAgent {
    fn select_action(&mut self, _state: &S, legal: &[Action], _explore: bool) -> Option<Action> {
        if legal.is_empty() {
            return None;
        }
        let idx = self.rng.random_range(0..legal.len());
        Some(legal[idx])
    }

    fn name(&self) -> &str {
        "Random"
    }
}
