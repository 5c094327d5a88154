//! Multi-seed evaluation of a frozen agent.
//!
//! Each seed drives its own random opponent, and the agent only ever appears
//! through a [`FrozenAgent`] view, so a seed's outcome counts depend on
//! nothing but the table and the seed.

use log::debug;
use rayon::prelude::*;

use crate::ai::{FrozenAgent, QLearningAgent, RandomAgent};
use crate::error::EpisodeError;
use crate::game::Game;

use super::episode::{agent_seat_for_episode, play_eval_episode};
use super::metrics::{EvaluationStats, OutcomeTally, SeedStats};
use super::progress::CancelToken;

/// What to evaluate: `games` per seed over seeds `base_seed..base_seed + seeds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalPlan {
    pub games: usize,
    pub seeds: usize,
    pub base_seed: u64,
    pub parallel: bool,
}

impl EvalPlan {
    pub fn seed_values(&self) -> Vec<u64> {
        (0..self.seeds as u64).map(|i| self.base_seed + i).collect()
    }
}

/// A seed whose games could not be completed.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedFailure {
    pub seed: u64,
    pub completed_games: usize,
    pub source: EpisodeError,
}

/// Everything an evaluation committed before it ended.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRun {
    pub stats: EvaluationStats,
    pub failure: Option<SeedFailure>,
    pub cancelled: bool,
}

impl EvaluationRun {
    /// Games completed across committed seeds plus the failing seed.
    pub fn completed_games(&self) -> usize {
        self.stats.total.games + self.failure.as_ref().map_or(0, |f| f.completed_games)
    }
}

/// Play `games` games against a random opponent seeded with `seed`,
/// alternating the agent's seat.
pub fn evaluate_seed<G: Game>(
    game: &G,
    agent: FrozenAgent<'_, G::State>,
    seed: u64,
    games: usize,
) -> Result<SeedStats, SeedFailure> {
    let mut view = agent;
    let mut opponent = RandomAgent::seeded(seed);
    let mut tally = OutcomeTally::default();
    for game_idx in 0..games {
        let outcome = play_eval_episode(
            game,
            &mut view,
            &mut opponent,
            agent_seat_for_episode(game_idx),
        )
        .map_err(|source| SeedFailure {
            seed,
            completed_games: game_idx,
            source,
        })?;
        tally.record(&outcome);
    }
    Ok(SeedStats::new(seed, tally))
}

/// Evaluate `agent` under every seed of `plan`.
///
/// Seeds are committed in order; the first failure or cancellation ends the
/// run and later seeds are dropped even if a parallel worker finished them.
/// `on_seed` sees each committed seed with its index.
pub fn evaluate<G: Game>(
    game: &G,
    agent: &QLearningAgent<G::State>,
    plan: &EvalPlan,
    cancel: &CancelToken,
    on_seed: &mut dyn FnMut(usize, &SeedStats),
) -> EvaluationRun {
    if plan.games == 0 {
        return EvaluationRun {
            stats: EvaluationStats::default(),
            failure: None,
            cancelled: false,
        };
    }

    let seeds = plan.seed_values();
    let view = agent.frozen_view();
    let run_seed = |seed: u64| -> Option<Result<SeedStats, SeedFailure>> {
        if cancel.is_cancelled() {
            return None;
        }
        Some(evaluate_seed(game, view, seed, plan.games))
    };

    let results: Vec<Option<Result<SeedStats, SeedFailure>>> = if plan.parallel {
        seeds.par_iter().map(|&seed| run_seed(seed)).collect()
    } else {
        let mut out = Vec::with_capacity(seeds.len());
        for &seed in &seeds {
            let result = run_seed(seed);
            let stop = !matches!(result, Some(Ok(_)));
            out.push(result);
            if stop {
                break;
            }
        }
        out
    };

    let mut committed = Vec::with_capacity(seeds.len());
    let mut failure = None;
    let mut cancelled = false;
    for result in results {
        match result {
            Some(Ok(stats)) => {
                debug!(
                    "seed {}: win {:.1}% draw {:.1}% loss {:.1}%",
                    stats.seed, stats.win_rate, stats.draw_rate, stats.loss_rate
                );
                on_seed(committed.len(), &stats);
                committed.push(stats);
            }
            Some(Err(f)) => {
                failure = Some(f);
                break;
            }
            None => {
                cancelled = true;
                break;
            }
        }
    }

    EvaluationRun {
        stats: EvaluationStats::from_seeds(plan.games, committed),
        failure,
        cancelled,
    }
}
