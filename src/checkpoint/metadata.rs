use serde::{Deserialize, Serialize};

use crate::ai::{QLearningAgent, QLearningConfig, QTable};
use crate::game::StateKey;
use crate::scoring::MetricSet;
use crate::training::{MetricsSource, TrainerConfig, TrainingReport};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything needed to rebuild an agent, written to agent.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "S: StateKey")]
pub struct AgentSnapshot<S> {
    pub version: u32,
    pub config: QLearningConfig,
    pub epsilon: f64,
    pub table: QTable<S>,
}

impl<S: StateKey> AgentSnapshot<S> {
    pub fn from_agent(agent: &QLearningAgent<S>) -> Self {
        AgentSnapshot {
            version: SNAPSHOT_VERSION,
            config: agent.config().clone(),
            epsilon: agent.epsilon(),
            table: agent.table().clone(),
        }
    }

    pub fn into_agent(self, name: impl Into<String>) -> QLearningAgent<S> {
        QLearningAgent::from_parts(self.config, self.table, self.epsilon).with_name(name)
    }
}

/// Descriptive record stored next to a snapshot, written to metadata.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub id: String,
    pub version: u32,
    pub training_episodes: usize,
    pub eval_games: usize,
    pub eval_seeds: usize,
    pub base_seed: u64,
    pub metrics_source: MetricsSource,
    pub metrics: MetricSet,
    pub hyperparameters: QLearningConfig,
    pub final_epsilon: f64,
    pub states_learned: usize,
    /// RFC3339.
    pub created_at: String,
}

impl AgentMetadata {
    pub fn from_report<S: StateKey>(
        id: impl Into<String>,
        report: &TrainingReport<S>,
        trainer: &TrainerConfig,
        agent: &QLearningAgent<S>,
        metrics: MetricSet,
    ) -> Self {
        AgentMetadata {
            id: id.into(),
            version: SNAPSHOT_VERSION,
            training_episodes: report.training.episodes(),
            eval_games: report.evaluation.games_per_seed,
            eval_seeds: report.evaluation.seeds.len(),
            base_seed: trainer.base_seed,
            metrics_source: report.metrics_source,
            metrics,
            hyperparameters: agent.config().clone(),
            final_epsilon: agent.epsilon(),
            states_learned: agent.table().num_states(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
