use crate::ai::Transition;
use crate::game::Action;

use super::metrics::RunningStats;

/// A transition as the agent learned from it, with the actions that were
/// legal in `next_state` (empty when terminal).
#[derive(Debug, Clone, PartialEq)]
pub struct SampledTransition<S> {
    pub transition: Transition<S>,
    pub next_legal: Vec<Action>,
}

/// Fixed-capacity ring buffer keeping the most recent training transitions.
///
/// Only used for after-the-fact introspection; the agent learns from each
/// transition as it happens.
pub struct TransitionSample<S> {
    buffer: Vec<SampledTransition<S>>,
    capacity: usize,
    position: usize,
}

impl<S: Clone> TransitionSample<S> {
    pub fn new(capacity: usize) -> Self {
        TransitionSample {
            buffer: Vec::with_capacity(capacity),
            capacity,
            position: 0,
        }
    }

    /// Add a transition. Overwrites the oldest when full; a zero-capacity
    /// sample keeps nothing.
    pub fn push(&mut self, transition: SampledTransition<S>) {
        if self.capacity == 0 {
            return;
        }
        if self.buffer.len() < self.capacity {
            self.buffer.push(transition);
        } else {
            self.buffer[self.position] = transition;
        }
        self.position = (self.position + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Contents, oldest first.
    pub fn to_vec(&self) -> Vec<SampledTransition<S>> {
        if self.buffer.len() < self.capacity {
            return self.buffer.clone();
        }
        let (newer, older) = self.buffer.split_at(self.position);
        older.iter().chain(newer.iter()).cloned().collect()
    }
}

/// What the trainer keeps about the updates it applied.
pub struct LearningLog<S> {
    pub sample: TransitionSample<S>,
    /// Absolute TD error of every applied update.
    pub td_error: RunningStats,
}

impl<S: Clone> LearningLog<S> {
    pub fn new(sample_capacity: usize) -> Self {
        LearningLog {
            sample: TransitionSample::new(sample_capacity),
            td_error: RunningStats::default(),
        }
    }

    pub fn record(&mut self, transition: Transition<S>, next_legal: &[Action], td_error: f64) {
        self.td_error.push(td_error.abs());
        self.sample.push(SampledTransition {
            transition,
            next_legal: next_legal.to_vec(),
        });
    }
}
