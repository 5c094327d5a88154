//! Agents: the `Policy` seam, the tabular Q-learning agent and its frozen
//! view, and the random baseline.

mod agent;
mod q_learning;
mod q_table;
mod random;

pub use agent::{Policy, Transition};
pub use q_learning::{FrozenAgent, QLearningAgent, QLearningConfig};
pub use q_table::{ActionValues, Confidence, QTable, StateEntry, TableStats};
pub use random::RandomAgent;
