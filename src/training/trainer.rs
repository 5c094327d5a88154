use std::time::Instant;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::ai::{QLearningAgent, RandomAgent};
use crate::error::{ConfigError, EpisodeError, TrainingAborted};
use crate::game::{Game, StateKey};

use super::episode::{agent_seat_for_episode, play_training_episode, Opponent};
use super::evaluation::{evaluate, EvalPlan};
use super::metrics::{EvaluationStats, MetricsSource, TrainingMetrics, TrainingRunStats};
use super::progress::{CancelToken, ProgressSnapshot, TrainingObserver};
use super::transitions::{LearningLog, SampledTransition};

/// Who the agent trains against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpponentKind {
    Random,
    SelfPlay,
}

/// Trainer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub num_episodes: usize,
    pub eval_games: usize,
    pub eval_seeds: usize,
    pub base_seed: u64,
    pub opponent: OpponentKind,
    pub log_interval: usize,
    /// Rolling window used by progress logs.
    pub log_window: usize,
    /// Recent transitions kept for the Bellman error estimate.
    pub transition_sample: usize,
    pub parallel_eval: bool,
    /// Seed for the training opponent. Unseeded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_seed: Option<u64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            num_episodes: 5000,
            eval_games: 200,
            eval_seeds: 5,
            base_seed: 42,
            opponent: OpponentKind::Random,
            log_interval: 500,
            log_window: 100,
            transition_sample: 2048,
            parallel_eval: true,
            training_seed: None,
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.eval_seeds < 1 {
            return Err(ConfigError::Validation(
                "training.eval_seeds must be >= 1".into(),
            ));
        }
        if self.log_interval < 1 {
            return Err(ConfigError::Validation(
                "training.log_interval must be >= 1".into(),
            ));
        }
        if self.log_window < 1 {
            return Err(ConfigError::Validation(
                "training.log_window must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// [`validate`](Self::validate), plus a check that `game` offers at
    /// least one action from its initial state.
    pub fn validate_for<G: Game>(&self, game: &G) -> Result<(), ConfigError> {
        self.validate()?;
        if game.legal_actions(&game.initial_state()).is_empty() {
            return Err(ConfigError::Validation(
                "game has no legal actions in its initial state".into(),
            ));
        }
        Ok(())
    }

    pub fn eval_plan(&self) -> EvalPlan {
        EvalPlan {
            games: self.eval_games,
            seeds: self.eval_seeds,
            base_seed: self.base_seed,
            parallel: self.parallel_eval,
        }
    }
}

/// Lifecycle of one trainer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainerPhase {
    Idle,
    Training,
    Evaluating,
    Done,
}

impl std::fmt::Display for TrainerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TrainerPhase::Idle => "idle",
            TrainerPhase::Training => "training",
            TrainerPhase::Evaluating => "evaluating",
            TrainerPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Result of a completed (or cancelled) trainer run.
#[derive(Debug, Clone)]
pub struct TrainingReport<S> {
    pub training: TrainingRunStats,
    pub evaluation: EvaluationStats,
    /// `Evaluation` unless evaluation was skipped.
    pub metrics_source: MetricsSource,
    /// Most recent training transitions, oldest first.
    pub transitions: Vec<SampledTransition<S>>,
    pub cancelled: bool,
}

/// Runs `Idle -> Training -> Evaluating -> Done` for one agent.
///
/// The training phase is the only place the agent is mutated. Evaluation
/// borrows it immutably, so it cannot learn or explore there.
pub struct Trainer<'a, G: Game> {
    game: &'a G,
    config: TrainerConfig,
    phase: TrainerPhase,
    observer: Option<Box<dyn TrainingObserver + 'a>>,
    cancel: CancelToken,
}

impl<'a, G: Game> Trainer<'a, G> {
    pub fn new(game: &'a G, config: TrainerConfig) -> Result<Self, ConfigError> {
        config.validate_for(game)?;
        Ok(Trainer {
            game,
            config,
            phase: TrainerPhase::Idle,
            observer: None,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_observer(mut self, observer: impl TrainingObserver + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn phase(&self) -> TrainerPhase {
        self.phase
    }

    fn enter(&mut self, phase: TrainerPhase) {
        self.phase = phase;
        if let Some(obs) = self.observer.as_mut() {
            obs.on_phase_changed(phase);
        }
    }

    /// Train `agent` for `num_episodes`, then evaluate it frozen.
    pub fn run(
        &mut self,
        agent: &mut QLearningAgent<G::State>,
    ) -> Result<TrainingReport<G::State>, Box<TrainingAborted>> {
        let mut log = LearningLog::new(self.config.transition_sample);
        let mut stats = TrainingRunStats::default();
        let started = Instant::now();

        self.enter(TrainerPhase::Training);
        let cancelled = match self.train(agent, &mut log, &mut stats, started) {
            Ok(cancelled) => cancelled,
            Err(source) => {
                finish_stats(&mut stats, agent, &log, started);
                return Err(Box::new(TrainingAborted {
                    phase: TrainerPhase::Training,
                    completed_episodes: stats.episodes(),
                    source,
                    partial: stats,
                    partial_evaluation: EvaluationStats::default(),
                }));
            }
        };
        finish_stats(&mut stats, agent, &log, started);
        info!(
            "Training complete: {} episodes | win {:.1}% draw {:.1}% loss {:.1}% | eps {:.4} | {} states | {:.1}s",
            stats.episodes(),
            stats.tally.win_rate(),
            stats.tally.draw_rate(),
            stats.tally.loss_rate(),
            stats.final_epsilon,
            stats.states_learned,
            stats.elapsed_secs,
        );

        let evaluation = if cancelled {
            warn!("Training cancelled after {} episodes, evaluation skipped", stats.episodes());
            EvaluationStats::default()
        } else {
            self.enter(TrainerPhase::Evaluating);
            match self.evaluate(agent) {
                Ok(evaluation) => evaluation,
                Err(mut aborted) => {
                    aborted.partial = stats;
                    return Err(aborted);
                }
            }
        };

        let cancelled = cancelled
            || (self.config.eval_games > 0 && evaluation.seeds.len() < self.config.eval_seeds);

        self.enter(TrainerPhase::Done);
        let metrics_source = if evaluation.is_empty() {
            MetricsSource::Training
        } else {
            MetricsSource::Evaluation
        };
        Ok(TrainingReport {
            training: stats,
            evaluation,
            metrics_source,
            transitions: log.sample.to_vec(),
            cancelled,
        })
    }

    /// Returns whether training was cancelled.
    fn train(
        &mut self,
        agent: &mut QLearningAgent<G::State>,
        log: &mut LearningLog<G::State>,
        stats: &mut TrainingRunStats,
        started: Instant,
    ) -> Result<bool, EpisodeError> {
        let mut opponent = match self.config.opponent {
            OpponentKind::SelfPlay => Opponent::SelfPlay,
            OpponentKind::Random => Opponent::Fixed(match self.config.training_seed {
                Some(seed) => RandomAgent::seeded(seed),
                None => RandomAgent::new(),
            }),
        };
        let mut window = TrainingMetrics::with_capacity(self.config.log_window);
        let total = self.config.num_episodes;

        info!(
            "Starting training for {} episodes against {:?} (alpha {}, gamma {}, decay {})",
            total,
            self.config.opponent,
            agent.config().alpha,
            agent.config().gamma,
            agent.config().epsilon_decay,
        );

        for idx in 0..total {
            if self.cancel.is_cancelled() {
                return Ok(true);
            }
            let outcome = play_training_episode(
                self.game,
                agent,
                &mut opponent,
                agent_seat_for_episode(idx),
                log,
            )?;
            agent.decay_epsilon();
            stats.tally.record(&outcome);
            window.record_episode(outcome);

            let episode = idx + 1;
            if let Some(obs) = self.observer.as_mut() {
                obs.on_episode_completed(episode, &outcome, agent.epsilon());
            }
            if episode % self.config.log_interval == 0 {
                let w = self.config.log_window;
                let elapsed = started.elapsed().as_secs_f64();
                let snapshot = ProgressSnapshot {
                    episode,
                    total_episodes: total,
                    epsilon: agent.epsilon(),
                    win_rate: window.win_rate(w),
                    draw_rate: window.draw_rate(w),
                    avg_game_length: window.average_game_length(w),
                    states_learned: agent.table().num_states(),
                    episodes_per_sec: if elapsed > 0.0 {
                        episode as f64 / elapsed
                    } else {
                        0.0
                    },
                };
                info!(
                    "Episode {}/{} | eps: {:.3} | win_rate({}): {:.1}% | draw: {:.1}% | avg_len: {:.1} | states: {}",
                    episode,
                    total,
                    snapshot.epsilon,
                    w,
                    snapshot.win_rate * 100.0,
                    snapshot.draw_rate * 100.0,
                    snapshot.avg_game_length,
                    snapshot.states_learned,
                );
                if let Some(obs) = self.observer.as_mut() {
                    obs.on_progress(&snapshot);
                }
            }
        }
        Ok(false)
    }

    /// Evaluate `agent` frozen across the configured seeds.
    ///
    /// Usable on its own to re-evaluate a stored agent. Cancellation keeps the
    /// seeds already committed.
    pub fn evaluate(
        &mut self,
        agent: &QLearningAgent<G::State>,
    ) -> Result<EvaluationStats, Box<TrainingAborted>> {
        let plan = self.config.eval_plan();
        if plan.games == 0 {
            info!("eval_games is 0, evaluation skipped");
            return Ok(EvaluationStats::default());
        }
        info!(
            "Evaluating over {} seeds x {} games (base seed {})",
            plan.seeds, plan.games, plan.base_seed
        );

        let mut observer = self.observer.take();
        let run = evaluate(self.game, agent, &plan, &self.cancel, &mut |index, stats| {
            if let Some(obs) = observer.as_mut() {
                obs.on_eval_seed_completed(index, plan.seeds, stats);
            }
        });
        self.observer = observer;

        let completed_games = run.completed_games();
        if let Some(failure) = run.failure {
            warn!(
                "Evaluation aborted on seed {} after {} games: {}",
                failure.seed, completed_games, failure.source
            );
            return Err(Box::new(TrainingAborted {
                phase: TrainerPhase::Evaluating,
                completed_episodes: completed_games,
                source: failure.source,
                partial: TrainingRunStats::default(),
                partial_evaluation: run.stats,
            }));
        }
        if run.cancelled {
            warn!(
                "Evaluation cancelled after {} of {} seeds",
                run.stats.seeds.len(),
                plan.seeds
            );
        }
        let ev = &run.stats;
        info!(
            "Evaluation: win {:.1}% (std {:.1}, min {:.1}, max {:.1}) | draw {:.1}% | loss {:.1}%",
            ev.win_rate.mean,
            ev.win_rate.std,
            ev.win_rate.min,
            ev.win_rate.max,
            ev.draw_rate.mean,
            ev.loss_rate.mean,
        );
        Ok(run.stats)
    }
}

fn finish_stats<S: StateKey>(
    stats: &mut TrainingRunStats,
    agent: &QLearningAgent<S>,
    log: &LearningLog<S>,
    started: Instant,
) {
    stats.final_epsilon = agent.epsilon();
    stats.states_learned = agent.table().num_states();
    stats.elapsed_secs = started.elapsed().as_secs_f64();
    stats.td_error = log.td_error;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{Policy, QLearningConfig};
    use crate::error::GameError;
    use crate::game::{Action, GameState, Step, TicTacToe};
    use std::sync::mpsc;

    use crate::training::episode::EpisodeOutcome;
    use crate::training::progress::TrainingUpdate;

    fn config(num_episodes: usize) -> TrainerConfig {
        TrainerConfig {
            num_episodes,
            eval_games: 20,
            eval_seeds: 3,
            log_interval: 50,
            training_seed: Some(7),
            ..TrainerConfig::default()
        }
    }

    fn agent() -> QLearningAgent<GameState> {
        QLearningAgent::with_seed(QLearningConfig::default(), 3)
    }

    /// Tic-tac-toe that fails on the `fail_at`-th step call overall.
    struct Flaky {
        calls: std::sync::atomic::AtomicUsize,
        fail_at: usize,
    }

    impl Game for Flaky {
        type State = GameState;

        fn initial_state(&self) -> GameState {
            GameState::initial()
        }

        fn legal_actions(&self, state: &GameState) -> Vec<Action> {
            state.legal_actions()
        }

        fn step(&self, state: &GameState, action: Action) -> Result<Step<GameState>, GameError> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == self.fail_at {
                return Err(GameError::GameOver);
            }
            TicTacToe.step(state, action)
        }
    }

    /// A game whose initial state offers nothing to play.
    struct NoMoves;

    impl Game for NoMoves {
        type State = GameState;

        fn initial_state(&self) -> GameState {
            GameState::initial()
        }

        fn legal_actions(&self, _state: &GameState) -> Vec<Action> {
            Vec::new()
        }

        fn step(&self, state: &GameState, action: Action) -> Result<Step<GameState>, GameError> {
            TicTacToe.step(state, action)
        }
    }

    #[test]
    fn test_empty_initial_action_set_rejected_before_run() {
        assert!(matches!(
            Trainer::new(&NoMoves, config(10)),
            Err(ConfigError::Validation(_))
        ));
        assert!(config(10).validate_for(&TicTacToe).is_ok());
    }

    #[test]
    fn test_cancel_before_evaluation_marks_report() {
        // Cancels on the final training episode, after the last boundary check.
        struct CancelAt(CancelToken, usize);

        impl TrainingObserver for CancelAt {
            fn on_episode_completed(&mut self, episode: usize, _outcome: &EpisodeOutcome, _epsilon: f64) {
                if episode == self.1 {
                    self.0.cancel();
                }
            }
        }

        let game = TicTacToe;
        let cancel = CancelToken::new();
        let mut trainer = Trainer::new(&game, config(20))
            .unwrap()
            .with_observer(CancelAt(cancel.clone(), 20))
            .with_cancel_token(cancel);
        let report = trainer.run(&mut agent()).unwrap();
        assert_eq!(report.training.episodes(), 20);
        assert!(report.evaluation.seeds.is_empty());
        assert_eq!(report.metrics_source, MetricsSource::Training);
        assert!(report.cancelled);
    }

    #[test]
    fn test_validation_rejects_zero_eval_seeds() {
        let mut c = config(10);
        c.eval_seeds = 0;
        assert!(Trainer::new(&TicTacToe, c).is_err());
    }

    #[test]
    fn test_run_reports_evaluation_separately() {
        let game = TicTacToe;
        let mut trainer = Trainer::new(&game, config(200)).unwrap();
        assert_eq!(trainer.phase(), TrainerPhase::Idle);
        let mut agent = agent();
        let report = trainer.run(&mut agent).unwrap();

        assert_eq!(trainer.phase(), TrainerPhase::Done);
        assert_eq!(report.metrics_source, MetricsSource::Evaluation);
        assert_eq!(report.training.episodes(), 200);
        assert_eq!(report.evaluation.seeds.len(), 3);
        assert_eq!(report.evaluation.total.games, 60);
        assert!(report.training.td_error.count > 0);
        assert!(!report.transitions.is_empty());
        assert_eq!(report.training.final_epsilon, agent.epsilon());
        assert!(!report.cancelled);
    }

    #[test]
    fn test_zero_eval_games_reports_training_source() {
        let game = TicTacToe;
        let mut c = config(30);
        c.eval_games = 0;
        let mut trainer = Trainer::new(&game, c).unwrap();
        let report = trainer.run(&mut agent()).unwrap();
        assert_eq!(report.metrics_source, MetricsSource::Training);
        assert!(report.evaluation.is_empty());
        assert!(report.evaluation.seeds.is_empty());
    }

    #[test]
    fn test_evaluating_phase_leaves_agent_untouched() {
        let game = TicTacToe;
        let mut trainer = Trainer::new(&game, config(100)).unwrap();
        let mut agent = agent();
        trainer.run(&mut agent).unwrap();

        let table = agent.table().clone();
        let epsilon = agent.epsilon();
        trainer.evaluate(&agent).unwrap();
        assert_eq!(agent.table(), &table);
        assert_eq!(agent.epsilon(), epsilon);
    }

    #[test]
    fn test_observer_sees_phases_in_order() {
        let game = TicTacToe;
        let (tx, rx) = mpsc::channel();
        let mut trainer = Trainer::new(&game, config(10)).unwrap().with_observer(tx);
        trainer.run(&mut agent()).unwrap();
        drop(trainer);

        let updates: Vec<TrainingUpdate> = rx.iter().collect();
        let phases: Vec<TrainerPhase> = updates
            .iter()
            .filter_map(|u| match u {
                TrainingUpdate::PhaseChanged(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![TrainerPhase::Training, TrainerPhase::Evaluating, TrainerPhase::Done]
        );
        let episodes = updates
            .iter()
            .filter(|u| matches!(u, TrainingUpdate::EpisodeCompleted { .. }))
            .count();
        assert_eq!(episodes, 10);
        let seeds = updates
            .iter()
            .filter(|u| matches!(u, TrainingUpdate::EvalSeedCompleted { .. }))
            .count();
        assert_eq!(seeds, 3);
    }

    #[test]
    fn test_game_failure_returns_partial_stats() {
        let game = Flaky {
            calls: Default::default(),
            fail_at: 40,
        };
        let mut trainer = Trainer::new(&game, config(100)).unwrap();
        let err = trainer.run(&mut agent()).unwrap_err();
        assert_eq!(err.phase, TrainerPhase::Training);
        assert!(err.completed_episodes >= 4);
        assert_eq!(err.completed_episodes, err.partial.episodes());
        assert!(matches!(
            err.source,
            EpisodeError::Game { source: GameError::GameOver, .. }
        ));
    }

    #[test]
    fn test_cancel_stops_at_episode_boundary() {
        let game = TicTacToe;
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut trainer = Trainer::new(&game, config(100))
            .unwrap()
            .with_cancel_token(cancel);
        let mut agent = agent();
        let report = trainer.run(&mut agent).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.training.episodes(), 0);
        assert_eq!(report.metrics_source, MetricsSource::Training);
        assert_eq!(agent.epsilon(), 1.0);
    }

    #[test]
    fn test_self_play_training() {
        let game = TicTacToe;
        let mut c = config(50);
        c.opponent = OpponentKind::SelfPlay;
        let mut trainer = Trainer::new(&game, c).unwrap();
        let mut agent = agent();
        let report = trainer.run(&mut agent).unwrap();
        assert_eq!(report.training.episodes(), 50);
        assert!(agent.table().num_states() > 0);
        assert_eq!(agent.name(), "Q-Learning");
    }

    #[test]
    fn test_zero_episodes_only_evaluates() {
        let game = TicTacToe;
        let mut trainer = Trainer::new(&game, config(0)).unwrap();
        let mut agent = agent();
        let report = trainer.run(&mut agent).unwrap();
        assert_eq!(report.training.episodes(), 0);
        assert_eq!(report.metrics_source, MetricsSource::Evaluation);
        assert!(agent.table().is_empty());
    }
}
