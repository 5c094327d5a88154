use std::path::{Path, PathBuf};

use log::warn;

use crate::ai::QLearningConfig;
use crate::checkpoint::CheckpointManagerConfig;
use crate::error::ConfigError;
use crate::search::SearchSettings;
use crate::tournament::TournamentConfig;
use crate::training::TrainerConfig;

/// File locations shared by the subcommands.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub checkpoint_dir: PathBuf,
    pub ratings_file: PathBuf,
    pub tournament_history: PathBuf,
    pub search_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            checkpoint_dir: PathBuf::from("models"),
            ratings_file: PathBuf::from("models/elo_ratings.json"),
            tournament_history: PathBuf::from("models/tournaments.json"),
            search_log: PathBuf::from("hyperparameter_search_log.csv"),
        }
    }
}

impl PathsConfig {
    pub fn checkpoint(&self) -> CheckpointManagerConfig {
        CheckpointManagerConfig {
            checkpoint_dir: self.checkpoint_dir.clone(),
        }
    }
}

/// Top-level application configuration, loadable from TOML.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub agent: QLearningConfig,
    pub training: TrainerConfig,
    pub search: SearchSettings,
    pub tournament: TournamentConfig,
    pub paths: PathsConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!("config file '{}' not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.agent.validate()?;
        self.training.validate()?;
        self.search.validate()?;
        self.tournament.validate()?;

        if self.paths.checkpoint_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "paths.checkpoint_dir must not be empty".into(),
            ));
        }
        if self.paths.ratings_file.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "paths.ratings_file must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// TOML with every default value, for writing a starter config file.
    pub fn default_toml() -> Result<String, ConfigError> {
        toml::to_string_pretty(&AppConfig::default())
            .map_err(|e| ConfigError::Validation(format!("serializing defaults: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::search::{SearchStrategy, TargetMetric};
    use crate::tournament::TournamentFormat;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        config.validate().expect("default config should be valid");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[agent]
alpha = 0.3
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!((config.agent.alpha - 0.3).abs() < 1e-12);
        // Other fields should be defaults
        assert!((config.agent.gamma - 0.99).abs() < 1e-12);
        assert_eq!(config.training.num_episodes, 5000);
        assert_eq!(config.tournament.games_per_match, 100);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_nested_sections_parse() {
        let toml_str = r#"
[search]
strategy = "random"
target = "bellman_error"
iterations = 7

[search.space.alpha]
min = 0.1
max = 0.2

[tournament]
format = "elimination"
games_per_match = 20

[paths]
checkpoint_dir = "agents"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.search.strategy, SearchStrategy::Random);
        assert_eq!(config.search.target, TargetMetric::BellmanError);
        assert_eq!(config.search.iterations, 7);
        let alpha = config.search.space.alpha.unwrap();
        assert_eq!((alpha.min, alpha.max), (0.1, 0.2));
        assert_eq!(config.tournament.format, TournamentFormat::Elimination);
        assert_eq!(config.paths.checkpoint().checkpoint_dir, PathBuf::from("agents"));
        assert_eq!(
            config.paths.ratings_file,
            PathsConfig::default().ratings_file
        );
    }

    #[test]
    fn test_validation_rejects_zero_alpha() {
        let mut config = AppConfig::default();
        config.agent.alpha = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_invalid_gamma() {
        let mut config = AppConfig::default();
        config.agent.gamma = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_epsilon_min_gt_start() {
        let mut config = AppConfig::default();
        config.agent.epsilon_start = 0.1;
        config.agent.epsilon_min = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_eval_seeds() {
        let mut config = AppConfig::default();
        config.training.eval_seeds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_games_per_match() {
        let mut config = AppConfig::default();
        config.tournament.games_per_match = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_inverted_search_range() {
        let mut config = AppConfig::default();
        if let Some(range) = config.search.space.gamma.as_mut() {
            range.min = 0.99;
            range.max = 0.5;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_checkpoint_dir() {
        let mut config = AppConfig::default();
        config.paths.checkpoint_dir = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = AppConfig::load_or_default(Path::new("nonexistent_config.toml")).unwrap();
        assert_eq!(config.training.num_episodes, 5000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
[training]
num_episodes = 500
"#
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.training.num_episodes, 500);
        // Others are defaults
        assert_eq!(config.agent, QLearningConfig::default());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[agent]\nepsilon_decay = 1.5\n").unwrap();
        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_default_toml_roundtrips() {
        let toml_str = AppConfig::default_toml().unwrap();
        let config: AppConfig = toml::from_str(&toml_str).unwrap();
        config.validate().expect("roundtripped config should be valid");
        assert_eq!(config, AppConfig::default());
    }
}
