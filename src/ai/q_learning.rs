//! Tabular Q-learning agent: epsilon-greedy policy over a [`QTable`] with the
//! one-step Bellman update.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::agent::{Policy, Transition};
use super::q_table::{Confidence, QTable, TableStats};
use crate::error::ConfigError;
use crate::game::{Action, StateKey};

/// Scalar hyperparameters of a Q-learning agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QLearningConfig {
    /// Learning rate.
    pub alpha: f64,
    /// Discount factor.
    pub gamma: f64,
    pub epsilon_start: f64,
    pub epsilon_min: f64,
    /// Multiplicative decay applied once per training episode.
    pub epsilon_decay: f64,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        QLearningConfig {
            alpha: 0.2,
            gamma: 0.99,
            epsilon_start: 1.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.9995,
        }
    }
}

impl QLearningConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(ConfigError::Validation(format!(
                "alpha must be in (0, 1], got {}",
                self.alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(ConfigError::Validation(format!(
                "gamma must be in [0, 1], got {}",
                self.gamma
            )));
        }
        if !(0.0..=1.0).contains(&self.epsilon_start) {
            return Err(ConfigError::Validation(format!(
                "epsilon_start must be in [0, 1], got {}",
                self.epsilon_start
            )));
        }
        if !(0.0..=self.epsilon_start).contains(&self.epsilon_min) {
            return Err(ConfigError::Validation(format!(
                "epsilon_min must be in [0, epsilon_start], got {}",
                self.epsilon_min
            )));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(ConfigError::Validation(format!(
                "epsilon_decay must be in (0, 1], got {}",
                self.epsilon_decay
            )));
        }
        Ok(())
    }
}

/// Owns one action-value table, the current epsilon and its hyperparameters.
///
/// A frozen agent ignores `update` and `decay_epsilon` and never explores.
#[derive(Debug, Clone)]
pub struct QLearningAgent<S> {
    name: String,
    config: QLearningConfig,
    table: QTable<S>,
    epsilon: f64,
    frozen: bool,
    rng: StdRng,
}

impl<S: StateKey> QLearningAgent<S> {
    pub fn new(config: QLearningConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Agent whose exploration is reproducible from `seed`.
    pub fn with_seed(config: QLearningConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: QLearningConfig, rng: StdRng) -> Self {
        QLearningAgent {
            name: "Q-Learning".to_string(),
            epsilon: config.epsilon_start,
            config,
            table: QTable::new(),
            frozen: false,
            rng,
        }
    }

    /// Rebuild an agent from a persisted snapshot.
    pub fn from_parts(config: QLearningConfig, table: QTable<S>, epsilon: f64) -> Self {
        let mut agent = Self::new(config);
        agent.table = table;
        agent.epsilon = epsilon.clamp(0.0, 1.0);
        agent
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn config(&self) -> &QLearningConfig {
        &self.config
    }

    pub fn table(&self) -> &QTable<S> {
        &self.table
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    /// Read-only greedy view used for evaluation and matches.
    pub fn frozen_view(&self) -> FrozenAgent<'_, S> {
        FrozenAgent { agent: self }
    }

    /// Set epsilon, clamped to [0, 1].
    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.clamp(0.0, 1.0);
    }

    pub fn reset_epsilon(&mut self) {
        self.epsilon = self.config.epsilon_start;
    }

    /// `epsilon = max(epsilon_min, epsilon * epsilon_decay)`. No-op when frozen.
    pub fn decay_epsilon(&mut self) {
        if self.frozen {
            return;
        }
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
    }

    pub fn q_value(&self, state: &S, action: Action) -> f64 {
        self.table.get(state, action)
    }

    pub fn greedy_action(&self, state: &S, legal: &[Action]) -> Option<Action> {
        self.table.best_action(state, legal)
    }

    pub fn ranked_actions(&self, state: &S, legal: &[Action]) -> Vec<(Action, f64)> {
        self.table.ranked_actions(state, legal)
    }

    pub fn advise(&self, state: &S, legal: &[Action]) -> Option<(Action, f64, Confidence)> {
        self.table.best_action_with_confidence(state, legal)
    }

    pub fn table_stats(&self) -> TableStats {
        self.table.stats()
    }

    /// Apply `Q[s][a] += alpha * (r + gamma * max_a' Q[s'][a'] * (1 - done) - Q[s][a])`.
    ///
    /// `next_legal` are the actions available from `next_state`. Returns the
    /// TD error applied, or `None` when the agent is frozen.
    pub fn update(&mut self, transition: &Transition<S>, next_legal: &[Action]) -> Option<f64> {
        if self.frozen {
            return None;
        }
        let current = self.table.get(&transition.state, transition.action);
        let future = if transition.done {
            0.0
        } else {
            self.config.gamma * self.table.max_value(&transition.next_state, next_legal)
        };
        let td_error = transition.reward + future - current;
        self.table.set(
            &transition.state,
            transition.action,
            current + self.config.alpha * td_error,
        );
        Some(td_error)
    }

    /// Drop everything learned and restart exploration.
    pub fn reset(&mut self) {
        self.table.clear();
        self.reset_epsilon();
    }
}

impl<S: StateKey> Policy<S> for QLearningAgent<S> {
    fn select_action(&mut self, state: &S, legal: &[Action], explore: bool) -> Option<Action> {
        if legal.is_empty() {
            return None;
        }
        if explore && !self.frozen && self.rng.random::<f64>() < self.epsilon {
            let idx = self.rng.random_range(0..legal.len());
            return Some(legal[idx]);
        }
        self.table.best_action(state, legal)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Borrowed greedy view over a [`QLearningAgent`]. It can only exploit, so
/// holding one is proof that the underlying agent is not learning.
#[derive(Debug)]
pub struct FrozenAgent<'a, S> {
    agent: &'a QLearningAgent<S>,
}

impl<S> Clone for FrozenAgent<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for FrozenAgent<'_, S> {}

impl<'a, S: StateKey> FrozenAgent<'a, S> {
    pub fn agent(&self) -> &'a QLearningAgent<S> {
        self.agent
    }
}

impl<S: StateKey> Policy<S> for FrozenAgent<'_, S> {
    fn select_action(&mut self, state: &S, legal: &[Action], _explore: bool) -> Option<Action> {
        self.agent.table.best_action(state, legal)
    }

    fn name(&self) -> &str {
        &self.agent.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> QLearningConfig {
        QLearningConfig {
            alpha: 0.5,
            gamma: 0.9,
            epsilon_start: 1.0,
            epsilon_min: 0.1,
            epsilon_decay: 0.5,
        }
    }

    fn transition(state: u32, action: Action, reward: f64, next: u32, done: bool) -> Transition<u32> {
        Transition {
            state,
            action,
            reward,
            next_state: next,
            done,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(QLearningConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_ranges() {
        let mut c = config();
        c.alpha = 0.0;
        assert!(c.validate().is_err());

        let mut c = config();
        c.gamma = 1.5;
        assert!(c.validate().is_err());

        let mut c = config();
        c.epsilon_min = 1.1;
        assert!(c.validate().is_err());

        let mut c = config();
        c.epsilon_decay = 0.0;
        assert!(c.validate().is_err());

        let mut c = config();
        c.alpha = f64::NAN;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_terminal_update() {
        let mut agent: QLearningAgent<u32> = QLearningAgent::with_seed(config(), 1);
        let td = agent.update(&transition(0, 3, 1.0, 1, true), &[]).unwrap();
        assert_eq!(td, 1.0);
        assert!((agent.q_value(&0, 3) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_bootstrapped_update_uses_legal_max() {
        let mut agent: QLearningAgent<u32> = QLearningAgent::with_seed(config(), 1);
        agent.update(&transition(1, 0, 1.0, 2, true), &[]);
        agent.update(&transition(1, 1, 4.0, 2, true), &[]);
        // Q[1] = {0: 0.5, 1: 2.0}; only action 0 is legal from state 1.
        let td = agent.update(&transition(0, 2, 0.0, 1, false), &[0]).unwrap();
        assert!((td - 0.45).abs() < 1e-12);
        assert!((agent.q_value(&0, 2) - 0.225).abs() < 1e-12);
    }

    #[test]
    fn test_frozen_agent_does_not_learn() {
        let mut agent: QLearningAgent<u32> = QLearningAgent::with_seed(config(), 1);
        agent.freeze();
        assert_eq!(agent.update(&transition(0, 0, 1.0, 1, true), &[]), None);
        agent.decay_epsilon();
        assert_eq!(agent.epsilon(), 1.0);
        assert!(agent.table().is_empty());
        agent.unfreeze();
        assert!(agent.update(&transition(0, 0, 1.0, 1, true), &[]).is_some());
    }

    #[test]
    fn test_epsilon_decay_floors_at_min() {
        let mut agent: QLearningAgent<u32> = QLearningAgent::with_seed(config(), 1);
        let mut previous = agent.epsilon();
        for _ in 0..50 {
            agent.decay_epsilon();
            assert!(agent.epsilon() <= previous);
            assert!(agent.epsilon() >= 0.1);
            previous = agent.epsilon();
        }
        assert_eq!(agent.epsilon(), 0.1);
        agent.decay_epsilon();
        assert_eq!(agent.epsilon(), 0.1);
    }

    #[test]
    fn test_set_epsilon_clamps() {
        let mut agent: QLearningAgent<u32> = QLearningAgent::with_seed(config(), 1);
        agent.set_epsilon(2.0);
        assert_eq!(agent.epsilon(), 1.0);
        agent.set_epsilon(-1.0);
        assert_eq!(agent.epsilon(), 0.0);
        agent.reset_epsilon();
        assert_eq!(agent.epsilon(), 1.0);
    }

    #[test]
    fn test_greedy_selection_without_exploration() {
        let mut agent: QLearningAgent<u32> = QLearningAgent::with_seed(config(), 1);
        agent.update(&transition(0, 4, 1.0, 1, true), &[]);
        for _ in 0..20 {
            assert_eq!(agent.select_action(&0, &[0, 4, 8], false), Some(4));
        }
        assert_eq!(agent.select_action(&0, &[], true), None);
    }

    #[test]
    fn test_full_exploration_stays_legal() {
        let mut agent: QLearningAgent<u32> = QLearningAgent::with_seed(config(), 7);
        for _ in 0..100 {
            let a = agent.select_action(&0, &[2, 5, 6], true).unwrap();
            assert!([2, 5, 6].contains(&a));
        }
    }

    #[test]
    fn test_frozen_view_is_greedy() {
        let mut agent: QLearningAgent<u32> = QLearningAgent::with_seed(config(), 1);
        agent.update(&transition(0, 6, 1.0, 1, true), &[]);
        let mut view = agent.frozen_view();
        assert_eq!(view.select_action(&0, &[1, 6], true), Some(6));
        assert_eq!(view.name(), "Q-Learning");
    }
}
