use std::time::Instant;

use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::csv_log::SearchLog;
use super::space::{ParamGrid, ParamSpace, SearchConfig};
use crate::ai::{QLearningAgent, QLearningConfig};
use crate::error::{ConfigError, SearchError};
use crate::game::Game;
use crate::scoring::{score_report, MetricName, MetricSet, MetricValue};
use crate::training::{mix_seed, CancelToken, Trainer, TrainerConfig};

/// Metric that decides the best configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMetric {
    CompositeScore,
    SampleEfficiency,
    /// Compared ascending.
    BellmanError,
}

impl TargetMetric {
    pub fn metric(self) -> MetricName {
        match self {
            TargetMetric::CompositeScore => MetricName::CompositeScore,
            TargetMetric::SampleEfficiency => MetricName::SampleEfficiency,
            TargetMetric::BellmanError => MetricName::BellmanError,
        }
    }
}

impl std::str::FromStr for TargetMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "composite_score" => Ok(TargetMetric::CompositeScore),
            "sample_efficiency" => Ok(TargetMetric::SampleEfficiency),
            "bellman_error" => Ok(TargetMetric::BellmanError),
            other => Err(format!(
                "unknown target metric '{other}' (composite_score, sample_efficiency, bellman_error)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Grid,
    Random,
}

/// Search section of the application config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub strategy: SearchStrategy,
    pub target: TargetMetric,
    /// Grid only: evaluate at most this many points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_configs: Option<usize>,
    /// Random only: number of sampled configurations.
    pub iterations: usize,
    pub seed: u64,
    /// Train configurations on the rayon pool.
    pub parallel: bool,
    /// Overrides `training.num_episodes` per configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episodes_per_config: Option<usize>,
    pub grid: ParamGrid,
    pub space: ParamSpace,
}

impl Default for SearchSettings {
    fn default() -> Self {
        SearchSettings {
            strategy: SearchStrategy::Grid,
            target: TargetMetric::CompositeScore,
            max_configs: None,
            iterations: 20,
            seed: 0,
            parallel: false,
            episodes_per_config: None,
            grid: ParamGrid::default(),
            space: ParamSpace::default(),
        }
    }
}

impl SearchSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_configs == Some(0) {
            return Err(ConfigError::Validation(
                "search.max_configs must be >= 1".into(),
            ));
        }
        if self.strategy == SearchStrategy::Random && self.iterations < 1 {
            return Err(ConfigError::Validation(
                "search.iterations must be >= 1".into(),
            ));
        }
        self.space.validate()
    }

    /// Every configuration the search will evaluate, validated against `base`.
    pub fn configs(&self, base: &QLearningConfig) -> Result<Vec<SearchConfig>, ConfigError> {
        self.validate()?;
        let configs = match self.strategy {
            SearchStrategy::Grid => self.grid.configs(base, self.max_configs),
            SearchStrategy::Random => self.space.configs(base, self.iterations, self.seed),
        };
        for c in &configs {
            c.apply(base).validate()?;
        }
        Ok(configs)
    }

    /// Trainer settings used for each configuration.
    pub fn trainer_config(&self, base: &TrainerConfig) -> TrainerConfig {
        let mut trainer = base.clone();
        if let Some(episodes) = self.episodes_per_config {
            trainer.num_episodes = episodes;
        }
        trainer
    }
}

/// Trains and scores one configuration. Implemented by the real
/// trainer-backed evaluator and by closures in tests.
pub trait ConfigEvaluator: Sync {
    fn evaluate(&self, config_id: usize, config: &QLearningConfig) -> Result<MetricSet, SearchError>;
}

impl<F> ConfigEvaluator for F
where
    F: Fn(usize, &QLearningConfig) -> Result<MetricSet, SearchError> + Sync,
{
    fn evaluate(&self, config_id: usize, config: &QLearningConfig) -> Result<MetricSet, SearchError> {
        self(config_id, config)
    }
}

/// Fresh agent, full trainer run, scorer. Seeds derive from the config id so
/// a search is reproducible.
pub struct TrainingEvaluator<'a, G: Game> {
    game: &'a G,
    trainer: TrainerConfig,
    cancel: CancelToken,
}

impl<'a, G: Game> TrainingEvaluator<'a, G> {
    pub fn new(game: &'a G, trainer: TrainerConfig) -> Result<Self, ConfigError> {
        trainer.validate_for(game)?;
        Ok(TrainingEvaluator {
            game,
            trainer,
            cancel: CancelToken::new(),
        })
    }

    /// Also stops the training loop of the configuration in flight.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl<G: Game> ConfigEvaluator for TrainingEvaluator<'_, G> {
    fn evaluate(&self, config_id: usize, config: &QLearningConfig) -> Result<MetricSet, SearchError> {
        config.validate()?;
        let seed = mix_seed(
            self.trainer.training_seed.unwrap_or(self.trainer.base_seed),
            config_id,
        );
        let mut trainer_config = self.trainer.clone();
        trainer_config.training_seed = Some(seed);

        let mut agent = QLearningAgent::with_seed(config.clone(), seed)
            .with_name(format!("search-{config_id}"));
        let report = Trainer::new(self.game, trainer_config)?
            .with_cancel_token(self.cancel.clone())
            .run(&mut agent)?;
        if report.cancelled {
            return Err(SearchError::Cancelled {
                completed_episodes: report.training.episodes(),
            });
        }
        Ok(score_report(&report, &agent))
    }
}

/// One evaluated configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// 1-based position in the search order.
    pub config_id: usize,
    pub config: SearchConfig,
    /// `None` when the run failed.
    pub metrics: Option<MetricSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_secs: f64,
    /// RFC3339.
    pub timestamp: String,
}

impl SearchResult {
    pub fn succeeded(&self) -> bool {
        self.metrics.is_some()
    }

    pub fn value(&self, metric: MetricName) -> MetricValue {
        self.metrics
            .as_ref()
            .map_or(MetricValue::Undefined, |m| m.get(metric))
    }
}

/// End-of-search summary. Failed configurations are counted, never hidden.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchSummary {
    pub target: TargetMetric,
    /// Configurations planned.
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub best: Option<SearchResult>,
    pub results: Vec<SearchResult>,
    pub duration_secs: f64,
}

impl SearchSummary {
    /// Planned configurations that never ran, or were cut short, because of
    /// cancellation.
    pub fn not_run(&self) -> usize {
        self.total - self.results.len()
    }
}

pub struct SearchEngine<'a, E: ConfigEvaluator> {
    evaluator: &'a E,
    settings: SearchSettings,
    log: Option<&'a SearchLog>,
    cancel: CancelToken,
}

impl<'a, E: ConfigEvaluator> SearchEngine<'a, E> {
    pub fn new(evaluator: &'a E, settings: SearchSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(SearchEngine {
            evaluator,
            settings,
            log: None,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_log(mut self, log: &'a SearchLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Evaluate every configuration derived from `base`.
    ///
    /// Invalid configurations are rejected before anything runs. A failed
    /// configuration is recorded and skipped for best-selection; a
    /// configuration error raised mid-run stops the search.
    pub fn run(&self, base: &QLearningConfig) -> Result<SearchSummary, SearchError> {
        let configs = self.settings.configs(base)?;
        if let Some(log) = self.log {
            log.ensure_header()?;
        }
        let start = Instant::now();
        let target = self.settings.target;
        info!(
            "{:?} search over {} configurations, target {}",
            self.settings.strategy,
            configs.len(),
            target.metric()
        );

        let mut summary = SearchSummary {
            target,
            total: configs.len(),
            succeeded: 0,
            failed: 0,
            cancelled: false,
            best: None,
            results: Vec::with_capacity(configs.len()),
            duration_secs: 0.0,
        };
        let evaluate = |(i, config): (usize, &SearchConfig)| -> Option<Evaluated> {
            if self.cancel.is_cancelled() {
                return None;
            }
            self.evaluate_one(i + 1, config, base)
        };
        if self.settings.parallel {
            let outcomes: Vec<Option<Evaluated>> =
                configs.par_iter().enumerate().map(evaluate).collect();
            for outcome in outcomes {
                if !self.commit_outcome(&mut summary, outcome)? {
                    break;
                }
            }
        } else {
            for item in configs.iter().enumerate() {
                if !self.commit_outcome(&mut summary, evaluate(item))? {
                    break;
                }
            }
        }
        summary.duration_secs = start.elapsed().as_secs_f64();

        match &summary.best {
            Some(best) => info!(
                "Search done: {}/{} succeeded, best #{} ({}) {} = {}",
                summary.succeeded,
                summary.total,
                best.config_id,
                best.config,
                target.metric(),
                best.value(target.metric())
            ),
            None => warn!(
                "Search done: {}/{} succeeded, no configuration produced a defined {}",
                summary.succeeded,
                summary.total,
                target.metric()
            ),
        }
        if summary.failed > 0 {
            warn!("{} configurations failed", summary.failed);
        }
        Ok(summary)
    }

    /// `None` when the evaluator was cancelled part-way through.
    fn evaluate_one(
        &self,
        config_id: usize,
        config: &SearchConfig,
        base: &QLearningConfig,
    ) -> Option<Evaluated> {
        let started = Instant::now();
        let timestamp = chrono::Utc::now().to_rfc3339();
        let (metrics, error, fatal) = match self.evaluator.evaluate(config_id, &config.apply(base)) {
            Ok(metrics) => (Some(metrics), None, None),
            Err(SearchError::Cancelled { completed_episodes }) => {
                info!(
                    "Config #{} cancelled after {} episodes, not recorded",
                    config_id, completed_episodes
                );
                return None;
            }
            Err(e) if e.is_fatal() => (None, Some(e.to_string()), Some(e)),
            Err(e) => (None, Some(e.to_string()), None),
        };
        let result = SearchResult {
            config_id,
            config: *config,
            metrics,
            error,
            duration_secs: started.elapsed().as_secs_f64(),
            timestamp,
        };
        Some((result, fatal))
    }

    /// Commit one evaluated configuration. `Ok(false)` means the search was
    /// cancelled before this configuration ran or while it ran.
    fn commit_outcome(
        &self,
        summary: &mut SearchSummary,
        outcome: Option<Evaluated>,
    ) -> Result<bool, SearchError> {
        let Some((result, fatal)) = outcome else {
            summary.cancelled = true;
            return Ok(false);
        };
        self.commit(summary, result);
        match fatal {
            Some(e) => Err(e),
            None => Ok(true),
        }
    }

    /// Record one result in search order: log row, counters, best so far.
    fn commit(&self, summary: &mut SearchSummary, result: SearchResult) {
        let metric = summary.target.metric();
        match &result.metrics {
            Some(_) => {
                summary.succeeded += 1;
                info!(
                    "Config #{}/{} ({}): {} = {}",
                    result.config_id,
                    summary.total,
                    result.config,
                    metric,
                    result.value(metric)
                );
            }
            None => {
                summary.failed += 1;
                warn!(
                    "Config #{} ({}) failed: {}",
                    result.config_id,
                    result.config,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        if let Some(log) = self.log {
            if let Err(e) = log.append(&result) {
                warn!("Could not write search log {}: {}", log.path().display(), e);
            }
        }
        let candidate = result.value(metric);
        let improves = candidate.is_defined()
            && summary
                .best
                .as_ref()
                .map_or(true, |best| metric.is_better(candidate, best.value(metric)));
        if improves {
            summary.best = Some(result.clone());
        }
        summary.results.push(result);
    }
}

/// A result plus the error that must stop the search, if any.
type Evaluated = (SearchResult, Option<SearchError>);
