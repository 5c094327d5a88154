use std::path::PathBuf;

use crate::training::{EvaluationStats, TrainerPhase, TrainingRunStats};

/// Errors raised by a game collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("illegal action {action} (legal: {legal:?})")]
    IllegalAction { action: usize, legal: Vec<usize> },

    #[error("game is already over")]
    GameOver,
}

/// Errors that abort a single episode.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EpisodeError {
    #[error("game failed after {moves} moves: {source}")]
    Game {
        moves: usize,
        #[source]
        source: GameError,
    },

    #[error("no legal actions in a non-terminal state after {moves} moves")]
    NoLegalActions { moves: usize },
}

/// Errors that can occur when loading or saving persistent data.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("snapshot not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid agent id '{0}'")]
    InvalidId(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

/// A trainer phase stopped because an episode failed. Statistics committed
/// before the failure are carried along.
#[derive(Debug, thiserror::Error)]
#[error("{phase} phase aborted after {completed_episodes} completed episodes: {source}")]
pub struct TrainingAborted {
    pub phase: TrainerPhase,
    pub completed_episodes: usize,
    #[source]
    pub source: EpisodeError,
    pub partial: TrainingRunStats,
    pub partial_evaluation: EvaluationStats,
}

/// Errors produced while evaluating one search configuration.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("training failed: {0}")]
    Training(#[from] Box<TrainingAborted>),

    #[error("search log: {0}")]
    Log(#[from] PersistenceError),

    /// Cancelled mid-run; the partial run is not a result.
    #[error("cancelled after {completed_episodes} training episodes")]
    Cancelled { completed_episodes: usize },
}

impl SearchError {
    /// Configuration errors halt the whole search; everything else only
    /// fails the configuration that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SearchError::Config(_))
    }
}

/// Errors that stop a tournament before it starts. Failures once it runs
/// are recorded in the report instead.
#[derive(Debug, thiserror::Error)]
pub enum TournamentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}
