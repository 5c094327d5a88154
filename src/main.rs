use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use flexi_logger::Logger;
use log::{info, warn};

use ml_tic_tac_toe::ai::QLearningAgent;
use ml_tic_tac_toe::checkpoint::{AgentMetadata, CheckpointManager};
use ml_tic_tac_toe::config::AppConfig;
use ml_tic_tac_toe::game::{Action, Game, GameState, TicTacToe};
use ml_tic_tac_toe::rating::RatingStore;
use ml_tic_tac_toe::scoring::{compute_metrics, score_report, MetricName, MetricSet, ScoringInput};
use ml_tic_tac_toe::search::{SearchEngine, SearchLog, SearchStrategy, TargetMetric, TrainingEvaluator};
use ml_tic_tac_toe::tournament::{
    load_participants, TournamentEngine, TournamentFormat, TournamentHistory,
};
use ml_tic_tac_toe::training::{MetricsSource, OpponentKind, Trainer, TrainingRunStats};

/// Train, score, rate and tune tabular Q-learning agents for tic-tac-toe.
#[derive(Parser)]
#[command(name = "ml_tic_tac_toe", version, about)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a new agent, score it and save it
    Train {
        /// Id the agent is saved under
        #[arg(long)]
        id: String,
        /// Override number of training episodes
        #[arg(long)]
        episodes: Option<usize>,
        #[arg(long)]
        alpha: Option<f64>,
        #[arg(long)]
        gamma: Option<f64>,
        #[arg(long)]
        epsilon_decay: Option<f64>,
        #[arg(long, value_enum)]
        opponent: Option<CliOpponent>,
        /// Seed for the training opponent
        #[arg(long)]
        seed: Option<u64>,
        /// Train and score without writing a checkpoint
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-evaluate a saved agent over fresh seeds
    Evaluate {
        #[arg(long)]
        id: String,
        #[arg(long)]
        games: Option<usize>,
        #[arg(long)]
        seeds: Option<usize>,
        #[arg(long)]
        base_seed: Option<u64>,
        /// Store the new metrics in the agent's metadata
        #[arg(long)]
        save: bool,
    },
    /// Hyperparameter search
    Search {
        #[arg(value_enum)]
        strategy: CliStrategy,
        /// composite_score, sample_efficiency or bellman_error
        #[arg(long)]
        target: Option<TargetMetric>,
        /// Random search: number of sampled configurations
        #[arg(long)]
        iterations: Option<usize>,
        /// Grid search: evaluate at most this many points
        #[arg(long)]
        max_configs: Option<usize>,
        /// Training episodes per configuration
        #[arg(long)]
        episodes: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        parallel: bool,
        /// Save the best configuration's agent under this id
        #[arg(long)]
        save_best: Option<String>,
    },
    /// Play saved agents against each other and update their ratings
    Tournament {
        #[arg(value_enum)]
        format: CliFormat,
        /// Agent ids; every saved agent when empty
        agents: Vec<String>,
        #[arg(long)]
        games: Option<usize>,
        /// Leave ratings untouched
        #[arg(long)]
        no_ratings: bool,
        #[arg(long)]
        sequential: bool,
    },
    /// List saved agents, best first
    Leaderboard {
        /// Metric name, or "rating" for ELO
        #[arg(long, default_value = "rating")]
        by: String,
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
    /// Print a config file with every default value
    DefaultConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliOpponent {
    Random,
    SelfPlay,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliStrategy {
    Grid,
    Random,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliFormat {
    RoundRobin,
    Elimination,
}

fn main() -> Result<()> {
    let _logger = Logger::try_with_env_or_str("info")?
        .format(flexi_logger::colored_default_format)
        .start()?;

    let cli = Cli::parse();
    if let Command::DefaultConfig = cli.command {
        print!("{}", AppConfig::default_toml()?);
        return Ok(());
    }

    let config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.command {
        Command::Train {
            id,
            episodes,
            alpha,
            gamma,
            epsilon_decay,
            opponent,
            seed,
            dry_run,
        } => {
            let mut config = config;
            if let Some(episodes) = episodes {
                config.training.num_episodes = episodes;
            }
            if let Some(alpha) = alpha {
                config.agent.alpha = alpha;
            }
            if let Some(gamma) = gamma {
                config.agent.gamma = gamma;
            }
            if let Some(decay) = epsilon_decay {
                config.agent.epsilon_decay = decay;
            }
            if let Some(opponent) = opponent {
                config.training.opponent = match opponent {
                    CliOpponent::Random => OpponentKind::Random,
                    CliOpponent::SelfPlay => OpponentKind::SelfPlay,
                };
            }
            if seed.is_some() {
                config.training.training_seed = seed;
            }
            config.validate().context("validating overrides")?;
            train(&config, &id, dry_run)
        }
        Command::Evaluate {
            id,
            games,
            seeds,
            base_seed,
            save,
        } => {
            let mut config = config;
            if let Some(games) = games {
                config.training.eval_games = games;
            }
            if let Some(seeds) = seeds {
                config.training.eval_seeds = seeds;
            }
            if let Some(base_seed) = base_seed {
                config.training.base_seed = base_seed;
            }
            config.validate().context("validating overrides")?;
            evaluate(&config, &id, save)
        }
        Command::Search {
            strategy,
            target,
            iterations,
            max_configs,
            episodes,
            seed,
            parallel,
            save_best,
        } => {
            let mut config = config;
            config.search.strategy = match strategy {
                CliStrategy::Grid => SearchStrategy::Grid,
                CliStrategy::Random => SearchStrategy::Random,
            };
            if let Some(target) = target {
                config.search.target = target;
            }
            if let Some(iterations) = iterations {
                config.search.iterations = iterations;
            }
            if max_configs.is_some() {
                config.search.max_configs = max_configs;
            }
            if episodes.is_some() {
                config.search.episodes_per_config = episodes;
            }
            if let Some(seed) = seed {
                config.search.seed = seed;
            }
            config.search.parallel |= parallel;
            config.validate().context("validating overrides")?;
            search(&config, save_best.as_deref())
        }
        Command::Tournament {
            format,
            agents,
            games,
            no_ratings,
            sequential,
        } => {
            let mut config = config;
            config.tournament.format = match format {
                CliFormat::RoundRobin => TournamentFormat::RoundRobin,
                CliFormat::Elimination => TournamentFormat::Elimination,
            };
            if let Some(games) = games {
                config.tournament.games_per_match = games;
            }
            if no_ratings {
                config.tournament.update_ratings = false;
            }
            if sequential {
                config.tournament.parallel = false;
            }
            config.validate().context("validating overrides")?;
            tournament(&config, agents)
        }
        Command::Leaderboard { by, top } => leaderboard(&config, &by, top),
        Command::DefaultConfig => Ok(()),
    }
}

fn train(config: &AppConfig, id: &str, dry_run: bool) -> Result<()> {
    let manager = CheckpointManager::new(config.paths.checkpoint());
    CheckpointManager::validate_id(id)?;
    if !dry_run && manager.exists(id) {
        warn!("Agent '{}' already exists and will be replaced", id);
    }

    let game = TicTacToe;
    let mut agent = match config.training.training_seed {
        Some(seed) => QLearningAgent::with_seed(config.agent.clone(), seed),
        None => QLearningAgent::new(config.agent.clone()),
    }
    .with_name(id);
    let report = Trainer::new(&game, config.training.clone())?
        .run(&mut agent)
        .context("training")?;
    let metrics = score_report(&report, &agent);
    print_metrics(id, &metrics);

    if dry_run {
        return Ok(());
    }
    let metadata = AgentMetadata::from_report(id, &report, &config.training, &agent, metrics);
    let path = manager
        .save_agent(&agent, &metadata)
        .with_context(|| format!("saving agent '{id}'"))?;
    info!("Saved agent '{}' to {}", id, path.display());
    Ok(())
}

fn evaluate(config: &AppConfig, id: &str, save: bool) -> Result<()> {
    let manager = CheckpointManager::new(config.paths.checkpoint());
    let agent = manager
        .load_agent::<GameState>(id)
        .with_context(|| format!("loading agent '{id}'"))?;

    let game = TicTacToe;
    let evaluation = Trainer::new(&game, config.training.clone())?
        .evaluate(&agent)
        .context("evaluating")?;
    if evaluation.is_empty() {
        bail!("no evaluation games were played (eval_games is 0)");
    }

    let training = TrainingRunStats::default();
    let legal_actions: &dyn Fn(&GameState) -> Vec<Action> = &|state| game.legal_actions(state);
    let metrics = compute_metrics(&ScoringInput {
        training: &training,
        evaluation: &evaluation,
        metrics_source: MetricsSource::Evaluation,
        table: agent.table(),
        transitions: &[],
        legal_actions: Some(legal_actions),
        gamma: agent.config().gamma,
        epsilon: agent.epsilon(),
        epsilon_min: agent.config().epsilon_min,
    });
    for s in &evaluation.seeds {
        println!(
            "  seed {:>20}: win {:5.1}% draw {:5.1}% loss {:5.1}%",
            s.seed, s.win_rate, s.draw_rate, s.loss_rate
        );
    }
    print_metrics(id, &metrics);

    if save {
        let mut metadata = manager.load_metadata(id)?;
        metadata.eval_games = evaluation.games_per_seed;
        metadata.eval_seeds = evaluation.seeds.len();
        metadata.base_seed = config.training.base_seed;
        metadata.metrics_source = MetricsSource::Evaluation;
        metadata.metrics = metrics;
        manager
            .save_agent(&agent, &metadata)
            .with_context(|| format!("saving agent '{id}'"))?;
        info!("Updated metrics of '{}'", id);
    }
    Ok(())
}

fn search(config: &AppConfig, save_best: Option<&str>) -> Result<()> {
    if let Some(id) = save_best {
        CheckpointManager::validate_id(id)?;
    }
    let game = TicTacToe;
    let trainer = config.search.trainer_config(&config.training);
    let evaluator = TrainingEvaluator::new(&game, trainer.clone())?;
    let log = SearchLog::new(&config.paths.search_log);
    let summary = SearchEngine::new(&evaluator, config.search.clone())?
        .with_log(&log)
        .run(&config.agent)
        .context("hyperparameter search")?;

    println!(
        "{} configurations: {} succeeded, {} failed{}",
        summary.total,
        summary.succeeded,
        summary.failed,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    let Some(best) = summary.best else {
        warn!("No configuration produced a defined {}", summary.target.metric());
        return Ok(());
    };
    println!(
        "Best #{}: {} | {} = {}",
        best.config_id,
        best.config,
        summary.target.metric(),
        best.value(summary.target.metric())
    );
    println!("Results logged to {}", log.path().display());

    if let Some(id) = save_best {
        let agent_config = best.config.apply(&config.agent);
        let mut trainer = trainer;
        trainer.training_seed = Some(config.search.seed);
        let mut agent = QLearningAgent::with_seed(agent_config, config.search.seed).with_name(id);
        let report = Trainer::new(&game, trainer.clone())?
            .run(&mut agent)
                .context("retraining best configuration")?;
        let metrics = score_report(&report, &agent);
        let metadata = AgentMetadata::from_report(id, &report, &trainer, &agent, metrics);
        CheckpointManager::new(config.paths.checkpoint()).save_agent(&agent, &metadata)?;
        info!("Saved best configuration as '{}'", id);
    }
    Ok(())
}

fn tournament(config: &AppConfig, agents: Vec<String>) -> Result<()> {
    let manager = CheckpointManager::new(config.paths.checkpoint());
    let ids = if agents.is_empty() {
        manager.list_ids()?
    } else {
        agents
    };
    let (participants, skipped) = load_participants::<GameState>(&manager, &ids);
    let ratings = RatingStore::open(&config.paths.ratings_file)
        .with_context(|| format!("opening {}", config.paths.ratings_file.display()))?;
    let history = TournamentHistory::new(&config.paths.tournament_history);

    let game = TicTacToe;
    let report = TournamentEngine::new(&game, &ratings, config.tournament.clone())?
        .with_history(&history)
        .run(&participants, skipped)
        .context("running tournament")?;

    println!(
        "{} tournament, {} rounds, {} matches ({} failed)",
        report.format,
        report.rounds,
        report.matches.len(),
        report.failed_matches()
    );
    println!(
        "{:>4}  {:<24} {:>6} {:>5} {:>5} {:>5} {:>8}",
        "rank", "agent", "points", "W", "D", "L", "rating"
    );
    for s in &report.standings {
        println!(
            "{:>4}  {:<24} {:>6} {:>5} {:>5} {:>5} {:>8.1}",
            s.rank, s.id, s.points, s.match_wins, s.match_draws, s.match_losses, s.rating
        );
    }
    match &report.champion {
        Some(champion) => println!("Champion: {champion}"),
        None => println!("No champion"),
    }
    for s in &report.skipped {
        warn!("Skipped '{}': {}", s.id, s.reason);
    }
    for w in &report.warnings {
        println!("Warning: {w}");
    }
    Ok(())
}

fn leaderboard(config: &AppConfig, by: &str, top: usize) -> Result<()> {
    let manager = CheckpointManager::new(config.paths.checkpoint());
    if by == "rating" {
        let ratings = RatingStore::open(&config.paths.ratings_file)
            .with_context(|| format!("opening {}", config.paths.ratings_file.display()))?;
        for (rank, (meta, rating)) in manager.ranked_by_rating(&ratings)?.iter().take(top).enumerate() {
            println!(
                "{:>3}. {:<24} {:>8.1}  composite {}",
                rank + 1,
                meta.id,
                rating,
                meta.metrics.composite_score
            );
        }
        return Ok(());
    }

    let metric: MetricName = by.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    for (rank, meta) in manager.ranked_by_metric(metric)?.iter().take(top).enumerate() {
        println!(
            "{:>3}. {:<24} {} = {}",
            rank + 1,
            meta.id,
            metric,
            meta.metrics.get(metric)
        );
    }
    Ok(())
}

fn print_metrics(id: &str, metrics: &MetricSet) {
    println!(
        "{} ({}): win {:.1}% draw {:.1}% loss {:.1}% | {} states",
        id,
        metrics.metrics_source,
        metrics.win_rate,
        metrics.draw_rate,
        metrics.loss_rate,
        metrics.states_learned
    );
    for (name, value) in metrics.iter() {
        println!("  {:<20} {}", name, value);
    }
    if !metrics.excluded_from_composite.is_empty() {
        let names: Vec<&str> = metrics
            .excluded_from_composite
            .iter()
            .map(|m| m.as_str())
            .collect();
        println!("  (composite excludes: {})", names.join(", "));
    }
}
