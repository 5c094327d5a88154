use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::io::{read_json, write_json_atomic};
use super::metadata::{AgentMetadata, AgentSnapshot};
use crate::ai::QLearningAgent;
use crate::error::PersistenceError;
use crate::game::StateKey;
use crate::rating::RatingStore;
use crate::scoring::MetricName;

const AGENT_FILE: &str = "agent.json";
const METADATA_FILE: &str = "metadata.json";

/// Configuration for the checkpoint manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointManagerConfig {
    pub checkpoint_dir: PathBuf,
}

impl Default for CheckpointManagerConfig {
    fn default() -> Self {
        CheckpointManagerConfig {
            checkpoint_dir: PathBuf::from("models"),
        }
    }
}

/// Saves, loads and lists agent snapshots. Each agent lives in its own
/// directory holding agent.json and metadata.json.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    config: CheckpointManagerConfig,
}

impl CheckpointManager {
    pub fn new(config: CheckpointManagerConfig) -> Self {
        CheckpointManager { config }
    }

    pub fn dir(&self) -> &Path {
        &self.config.checkpoint_dir
    }

    /// Agent ids double as directory names.
    pub fn validate_id(id: &str) -> Result<(), PersistenceError> {
        let ok = !id.is_empty()
            && !id.starts_with('.')
            && !id.ends_with(".tmp")
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if ok {
            Ok(())
        } else {
            Err(PersistenceError::InvalidId(id.to_string()))
        }
    }

    pub fn agent_dir(&self, id: &str) -> Result<PathBuf, PersistenceError> {
        Self::validate_id(id)?;
        Ok(self.config.checkpoint_dir.join(id))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.agent_dir(id)
            .map(|d| d.join(AGENT_FILE).is_file())
            .unwrap_or(false)
    }

    /// Write an agent snapshot and its metadata. The directory is built under
    /// a temporary name and renamed into place, replacing any previous save.
    pub fn save_agent<S: StateKey>(
        &self,
        agent: &QLearningAgent<S>,
        metadata: &AgentMetadata,
    ) -> Result<PathBuf, PersistenceError> {
        let final_dir = self.agent_dir(&metadata.id)?;
        let tmp_dir = self
            .config
            .checkpoint_dir
            .join(format!("{}.tmp", metadata.id));

        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;
        write_json_atomic(&tmp_dir.join(AGENT_FILE), &AgentSnapshot::from_agent(agent))?;
        write_json_atomic(&tmp_dir.join(METADATA_FILE), metadata)?;

        if final_dir.exists() {
            fs::remove_dir_all(&final_dir)?;
        }
        fs::rename(&tmp_dir, &final_dir)?;
        debug!("Saved agent '{}' to {}", metadata.id, final_dir.display());
        Ok(final_dir)
    }

    /// Rebuild a saved agent. The agent is named after its id.
    pub fn load_agent<S: StateKey>(&self, id: &str) -> Result<QLearningAgent<S>, PersistenceError> {
        let snapshot: AgentSnapshot<S> = read_json(&self.agent_dir(id)?.join(AGENT_FILE))?;
        Ok(snapshot.into_agent(id))
    }

    pub fn load_metadata(&self, id: &str) -> Result<AgentMetadata, PersistenceError> {
        read_json(&self.agent_dir(id)?.join(METADATA_FILE))
    }

    pub fn delete_agent(&self, id: &str) -> Result<bool, PersistenceError> {
        let dir = self.agent_dir(id)?;
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(dir)?;
        Ok(true)
    }

    /// Ids of every saved agent, sorted. Missing checkpoint directory means none.
    pub fn list_ids(&self) -> Result<Vec<String>, PersistenceError> {
        let entries = match fs::read_dir(&self.config.checkpoint_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() || !path.join(AGENT_FILE).is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if Self::validate_id(&name).is_ok() {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Metadata of every saved agent. Unreadable metadata is logged and skipped.
    pub fn list_agents(&self) -> Result<Vec<AgentMetadata>, PersistenceError> {
        let mut out = Vec::new();
        for id in self.list_ids()? {
            match self.load_metadata(&id) {
                Ok(meta) => out.push(meta),
                Err(e) => warn!("Skipping agent '{}': {}", id, e),
            }
        }
        Ok(out)
    }

    /// Saved agents best first by `metric`; undefined values go last.
    pub fn ranked_by_metric(&self, metric: MetricName) -> Result<Vec<AgentMetadata>, PersistenceError> {
        let mut agents = self.list_agents()?;
        agents.sort_by(|a, b| {
            metric
                .cmp_best_first(a.metrics.get(metric), b.metrics.get(metric))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(agents)
    }

    /// Saved agents by descending rating. Unrated agents get the initial rating.
    pub fn ranked_by_rating(
        &self,
        ratings: &RatingStore,
    ) -> Result<Vec<(AgentMetadata, f64)>, PersistenceError> {
        let mut agents: Vec<(AgentMetadata, f64)> = self
            .list_agents()?
            .into_iter()
            .map(|m| {
                let r = ratings.rating(&m.id);
                (m, r)
            })
            .collect();
        agents.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
        Ok(agents)
    }
}
