//! End-to-end: train, score, checkpoint, rate in a tournament, search.

use std::path::Path;

use ml_tic_tac_toe::ai::{QLearningAgent, QLearningConfig};
use ml_tic_tac_toe::checkpoint::{AgentMetadata, CheckpointManager, CheckpointManagerConfig};
use ml_tic_tac_toe::error::SearchError;
use ml_tic_tac_toe::game::{GameState, TicTacToe};
use ml_tic_tac_toe::rating::{update_rating, MatchTally, RatingStore, INITIAL_RATING};
use ml_tic_tac_toe::scoring::{score_report, MetricName, MetricSet, MetricValue};
use ml_tic_tac_toe::search::{
    ParamGrid, SearchEngine, SearchLog, SearchSettings, SearchStrategy, TrainingEvaluator,
};
use ml_tic_tac_toe::tournament::{
    load_participants, TournamentConfig, TournamentEngine, TournamentFormat, TournamentHistory,
    TournamentStatus,
};
use ml_tic_tac_toe::training::{MetricsSource, Trainer, TrainerConfig, TrainingReport};

fn trainer_config(episodes: usize, seed: u64) -> TrainerConfig {
    TrainerConfig {
        num_episodes: episodes,
        eval_games: 20,
        eval_seeds: 3,
        log_interval: 1000,
        parallel_eval: false,
        training_seed: Some(seed),
        ..TrainerConfig::default()
    }
}

fn train(
    episodes: usize,
    seed: u64,
) -> (QLearningAgent<GameState>, TrainingReport<GameState>, TrainerConfig) {
    let config = trainer_config(episodes, seed);
    let agent_config = QLearningConfig {
        epsilon_decay: 0.995,
        ..QLearningConfig::default()
    };
    let mut agent = QLearningAgent::with_seed(agent_config, seed);
    let report = Trainer::new(&TicTacToe, config.clone())
        .unwrap()
        .run(&mut agent)
        .unwrap();
    (agent, report, config)
}

fn manager(dir: &Path) -> CheckpointManager {
    CheckpointManager::new(CheckpointManagerConfig {
        checkpoint_dir: dir.join("models"),
    })
}

#[test]
fn test_train_score_checkpoint_tournament() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    for (id, episodes, seed) in [("novice", 20, 1), ("trained", 400, 2), ("veteran", 800, 3)] {
        let (agent, report, config) = train(episodes, seed);
        assert_eq!(report.metrics_source, MetricsSource::Evaluation);
        let metrics = score_report(&report, &agent);
        let composite = metrics.composite_score.value().unwrap();
        assert!((0.0..=100.0).contains(&composite), "{id}: {composite}");

        let meta = AgentMetadata::from_report(id, &report, &config, &agent, metrics);
        manager.save_agent(&agent, &meta).unwrap();
    }
    assert_eq!(manager.list_ids().unwrap().len(), 3);
    let ranked = manager.ranked_by_metric(MetricName::CompositeScore).unwrap();
    assert_eq!(ranked.len(), 3);

    let ids = manager.list_ids().unwrap();
    let (participants, skipped) = load_participants::<GameState>(&manager, &ids);
    assert_eq!(participants.len(), 3);
    assert!(skipped.is_empty());

    let ratings_path = dir.path().join("elo.json");
    let ratings = RatingStore::open(&ratings_path).unwrap();
    let history = TournamentHistory::new(dir.path().join("tournaments.json"));
    let config = TournamentConfig {
        format: TournamentFormat::RoundRobin,
        games_per_match: 10,
        ..TournamentConfig::default()
    };
    let report = TournamentEngine::new(&TicTacToe, &ratings, config)
        .unwrap()
        .with_history(&history)
        .run(&participants, skipped)
        .unwrap();

    assert_eq!(report.status, TournamentStatus::Complete);
    assert_eq!(report.matches.len(), 3);
    assert_eq!(report.failed_matches(), 0);
    assert_eq!(report.champion.as_deref(), Some(report.standings[0].id.as_str()));
    for m in &report.matches {
        assert_eq!(m.tally.unwrap().games(), 10);
    }

    // ELO is zero-sum, and the updates survive a reopen.
    let total: f64 = ratings.ratings().values().sum();
    assert!((total - 3.0 * INITIAL_RATING).abs() < 1e-6);
    let reopened = RatingStore::open(&ratings_path).unwrap();
    assert_eq!(reopened.ratings(), ratings.ratings());
    assert_eq!(reopened.history(None, 10).len(), 3);

    let by_rating = manager.ranked_by_rating(&reopened).unwrap();
    assert_eq!(by_rating.len(), 3);
    assert!(by_rating.windows(2).all(|w| w[0].1 >= w[1].1));
    assert_eq!(history.load(5).unwrap().len(), 1);
}

#[test]
fn test_elo_single_game_between_equal_ratings() {
    let (a, b) = update_rating(1500.0, 1500.0, 1.0);
    assert!((a - 1516.0).abs() < 1e-9);
    assert!((b - 1484.0).abs() < 1e-9);

    let store = RatingStore::in_memory();
    let record = store
        .record_match(
            "a",
            "b",
            MatchTally {
                a_wins: 1,
                b_wins: 0,
                draws: 0,
            },
        )
        .unwrap();
    assert!((record.rating_a_after - 1516.0).abs() < 1e-9);
    assert!((record.rating_b_after - 1484.0).abs() < 1e-9);
    assert!((store.rating("a") + store.rating("b") - 3000.0).abs() < 1e-9);
}

fn assert_seed_bounds(report: &TrainingReport<GameState>, games: usize, seeds: usize) {
    let ev = &report.evaluation;
    assert_eq!(ev.seeds.len(), seeds);
    let values: Vec<u64> = ev.seeds.iter().map(|s| s.seed).collect();
    assert_eq!(values, (42..42 + seeds as u64).collect::<Vec<_>>());
    for s in &ev.seeds {
        assert_eq!(s.tally.games, games);
        assert!((0.0..=100.0).contains(&s.win_rate));
        assert!((s.win_rate + s.draw_rate + s.loss_rate - 100.0).abs() < 1e-9);
    }
    assert!(ev.win_rate.min - 1e-9 <= ev.win_rate.mean);
    assert!(ev.win_rate.mean <= ev.win_rate.max + 1e-9);
    assert!(ev.win_rate.std >= 0.0);
    assert_eq!(ev.total.games, games * seeds);
}

#[test]
fn test_multi_seed_evaluation_bounds() {
    let config = TrainerConfig {
        num_episodes: 300,
        eval_games: 30,
        eval_seeds: 5,
        base_seed: 42,
        log_interval: 1000,
        parallel_eval: true,
        training_seed: Some(7),
        ..TrainerConfig::default()
    };
    let mut agent = QLearningAgent::with_seed(QLearningConfig::default(), 7);
    let report = Trainer::new(&TicTacToe, config).unwrap().run(&mut agent).unwrap();
    assert_seed_bounds(&report, 30, 5);
}

#[test]
#[ignore = "full-scale run, several seconds in release"]
fn test_full_scale_multi_seed_evaluation() {
    let config = TrainerConfig {
        num_episodes: 5000,
        eval_games: 200,
        eval_seeds: 5,
        base_seed: 42,
        log_interval: 1000,
        parallel_eval: true,
        training_seed: Some(7),
        ..TrainerConfig::default()
    };
    let agent_config = QLearningConfig {
        gamma: 0.95,
        epsilon_decay: 0.995,
        ..QLearningConfig::default()
    };
    let mut agent = QLearningAgent::with_seed(agent_config, 7);
    let report = Trainer::new(&TicTacToe, config).unwrap().run(&mut agent).unwrap();
    assert_eq!(report.training.episodes(), 5000);
    assert_eq!(report.metrics_source, MetricsSource::Evaluation);
    assert_seed_bounds(&report, 200, 5);

    let metrics = score_report(&report, &agent);
    let composite = metrics.composite_score.value().unwrap();
    assert!((0.0..=100.0).contains(&composite));
}

#[test]
fn test_training_is_reproducible_from_seeds() {
    let (a, ra, _) = train(200, 11);
    let (b, rb, _) = train(200, 11);
    assert_eq!(a.table(), b.table());
    assert_eq!(ra.evaluation, rb.evaluation);
    assert_eq!(score_report(&ra, &a), score_report(&rb, &b));
}

#[test]
fn test_stub_grid_search_picks_max_composite() {
    let dir = tempfile::tempdir().unwrap();
    let log = SearchLog::new(dir.path().join("search.csv"));
    let settings = SearchSettings {
        strategy: SearchStrategy::Grid,
        grid: ParamGrid {
            alpha: vec![0.1, 0.3],
            gamma: vec![0.9, 0.99],
            epsilon_decay: vec![0.99, 0.999],
            epsilon_min: Vec::new(),
        },
        ..SearchSettings::default()
    };
    let evaluator = |_id: usize, c: &QLearningConfig| -> Result<MetricSet, SearchError> {
        let mut m = MetricSet::undefined(MetricsSource::Evaluation);
        m.composite_score = MetricValue::Exact(100.0 * c.alpha * c.gamma * c.epsilon_decay);
        Ok(m)
    };
    let summary = SearchEngine::new(&evaluator, settings)
        .unwrap()
        .with_log(&log)
        .run(&QLearningConfig::default())
        .unwrap();

    assert_eq!(summary.total, 8);
    assert_eq!(summary.succeeded, 8);
    let best = summary.best.unwrap();
    assert_eq!(
        (best.config.alpha, best.config.gamma, best.config.epsilon_decay),
        (0.3, 0.99, 0.999)
    );
    let content = std::fs::read_to_string(log.path()).unwrap();
    assert_eq!(content.lines().count(), 9);
}

#[test]
fn test_search_with_real_training() {
    let settings = SearchSettings {
        strategy: SearchStrategy::Grid,
        episodes_per_config: Some(100),
        grid: ParamGrid {
            alpha: vec![0.1, 0.5],
            gamma: Vec::new(),
            epsilon_decay: Vec::new(),
            epsilon_min: Vec::new(),
        },
        ..SearchSettings::default()
    };
    let trainer = settings.trainer_config(&trainer_config(5000, 3));
    assert_eq!(trainer.num_episodes, 100);
    let evaluator = TrainingEvaluator::new(&TicTacToe, trainer).unwrap();
    let summary = SearchEngine::new(&evaluator, settings)
        .unwrap()
        .run(&QLearningConfig::default())
        .unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.failed, 0);
    let best = summary.best.unwrap();
    assert!(best.value(MetricName::CompositeScore).is_defined());
    for r in &summary.results {
        let m = r.metrics.as_ref().unwrap();
        assert_eq!(m.total_episodes, 100);
    }
}
