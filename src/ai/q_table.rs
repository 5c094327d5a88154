//! Tabular action-value store.
//!
//! Entries are created lazily: a `(state, action)` pair that was never
//! written reads as 0.0, the same numeric value as a pair that was written
//! with 0.0, but only written pairs count as visited.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::game::{Action, StateKey};

/// Per-state action values, ordered by action index.
pub type ActionValues = BTreeMap<Action, f64>;

/// Serialized form of one table row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEntry<S> {
    pub state: S,
    pub values: ActionValues,
}

/// Mapping `(state, action) -> value`, keyed by state with a nested per-action
/// map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    bound = "S: StateKey",
    into = "Vec<StateEntry<S>>",
    from = "Vec<StateEntry<S>>"
)]
pub struct QTable<S> {
    entries: HashMap<S, ActionValues>,
}

/// Summary of the stored values, for introspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    pub states: usize,
    pub state_actions: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// How clearly the best action stands out from the runner-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    /// Only one legal action.
    Certain,
    VeryConfident,
    Confident,
    FairlySure,
    Unsure,
    /// Several actions share the best value.
    Hesitant,
}

impl Confidence {
    /// Classify the gap between the best and second-best value.
    pub fn from_gap(gap: f64) -> Self {
        if gap > 0.5 {
            Confidence::VeryConfident
        } else if gap > 0.2 {
            Confidence::Confident
        } else if gap > 0.05 {
            Confidence::FairlySure
        } else if gap > 0.0 {
            Confidence::Unsure
        } else {
            Confidence::Hesitant
        }
    }
}

impl<S: StateKey> QTable<S> {
    pub fn new() -> Self {
        QTable {
            entries: HashMap::new(),
        }
    }

    /// Value of `(state, action)`, 0.0 when never visited.
    pub fn get(&self, state: &S, action: Action) -> f64 {
        self.entries
            .get(state)
            .and_then(|values| values.get(&action))
            .copied()
            .unwrap_or(0.0)
    }

    /// Stored values for a state, `None` if the state was never visited.
    pub fn values(&self, state: &S) -> Option<&ActionValues> {
        self.entries.get(state)
    }

    pub fn set(&mut self, state: &S, action: Action, value: f64) {
        self.entries
            .entry(state.clone())
            .or_default()
            .insert(action, value);
    }

    /// Max value over `legal`, 0.0 when `legal` is empty.
    pub fn max_value(&self, state: &S, legal: &[Action]) -> f64 {
        self.best_action(state, legal)
            .map(|a| self.get(state, a))
            .unwrap_or(0.0)
    }

    /// Greedy action over `legal`. Ties resolve to the lowest action index.
    pub fn best_action(&self, state: &S, legal: &[Action]) -> Option<Action> {
        let mut best: Option<(Action, f64)> = None;
        for &action in legal {
            let value = self.get(state, action);
            best = match best {
                Some((a, v)) if v > value || (v == value && a < action) => Some((a, v)),
                _ => Some((action, value)),
            };
        }
        best.map(|(a, _)| a)
    }

    /// `(action, value)` for every legal action, best first. Equal values keep
    /// ascending action order.
    pub fn ranked_actions(&self, state: &S, legal: &[Action]) -> Vec<(Action, f64)> {
        let mut ranked: Vec<(Action, f64)> =
            legal.iter().map(|&a| (a, self.get(state, a))).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
    }

    /// Best action with a confidence label derived from the value gap.
    pub fn best_action_with_confidence(
        &self,
        state: &S,
        legal: &[Action],
    ) -> Option<(Action, f64, Confidence)> {
        let ranked = self.ranked_actions(state, legal);
        let (action, value) = *ranked.first()?;
        let confidence = match ranked.get(1) {
            None => Confidence::Certain,
            Some(&(_, second)) => Confidence::from_gap(value - second),
        };
        Some((action, value, confidence))
    }

    /// Number of visited states.
    pub fn num_states(&self) -> usize {
        self.entries.len()
    }

    /// Number of visited `(state, action)` pairs.
    pub fn num_state_actions(&self) -> usize {
        self.entries.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&S, &ActionValues)> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> TableStats {
        let values: Vec<f64> = self
            .entries
            .values()
            .flat_map(|v| v.values().copied())
            .collect();
        if values.is_empty() {
            return TableStats {
                states: self.entries.len(),
                ..TableStats::default()
            };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        TableStats {
            states: self.entries.len(),
            state_actions: values.len(),
            mean,
            std: var.sqrt(),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

impl<S: StateKey> PartialEq for QTable<S> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<S: StateKey> Default for QTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StateKey> From<QTable<S>> for Vec<StateEntry<S>> {
    fn from(table: QTable<S>) -> Self {
        table
            .entries
            .into_iter()
            .map(|(state, values)| StateEntry { state, values })
            .collect()
    }
}

impl<S: StateKey> From<Vec<StateEntry<S>>> for QTable<S> {
    fn from(rows: Vec<StateEntry<S>>) -> Self {
        QTable {
            entries: rows.into_iter().map(|e| (e.state, e.values)).collect(),
        }
    }
}
