use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::episode::{EpisodeOutcome, EpisodeWinner};

/// Which statistics block downstream metrics were computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsSource {
    Evaluation,
    Training,
}

impl MetricsSource {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricsSource::Evaluation => "evaluation",
            MetricsSource::Training => "training",
        }
    }
}

impl std::fmt::Display for MetricsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Win/draw/loss counts for a batch of episodes, from the agent's side.
///
/// Episode return is 1 for a win, 0 for a draw and -1 for a loss. Rates are
/// percentages in [0, 100].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeTally {
    pub games: usize,
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
    pub total_moves: usize,
}

impl OutcomeTally {
    pub fn record(&mut self, outcome: &EpisodeOutcome) {
        self.games += 1;
        self.total_moves += outcome.moves;
        match outcome.winner {
            EpisodeWinner::Agent => self.wins += 1,
            EpisodeWinner::Draw => self.draws += 1,
            EpisodeWinner::Opponent => self.losses += 1,
        }
    }

    pub fn merge(&mut self, other: &OutcomeTally) {
        self.games += other.games;
        self.wins += other.wins;
        self.draws += other.draws;
        self.losses += other.losses;
        self.total_moves += other.total_moves;
    }

    pub fn is_empty(&self) -> bool {
        self.games == 0
    }

    fn percent(&self, count: usize) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        count as f64 * 100.0 / self.games as f64
    }

    pub fn win_rate(&self) -> f64 {
        self.percent(self.wins)
    }

    pub fn draw_rate(&self) -> f64 {
        self.percent(self.draws)
    }

    pub fn loss_rate(&self) -> f64 {
        self.percent(self.losses)
    }

    pub fn total_reward(&self) -> f64 {
        self.wins as f64 - self.losses as f64
    }

    pub fn avg_reward(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        self.total_reward() / self.games as f64
    }

    pub fn avg_moves(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        self.total_moves as f64 / self.games as f64
    }

    /// Population variance of episode returns. Returns are in {-1, 0, 1} so
    /// `E[x^2]` is the decisive-game fraction.
    pub fn return_variance(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        let n = self.games as f64;
        let mean = self.total_reward() / n;
        let mean_sq = (self.wins + self.losses) as f64 / n;
        (mean_sq - mean * mean).max(0.0)
    }
}

/// Online mean/variance accumulator (Welford).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    pub count: usize,
    pub mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Population variance, 0.0 when empty.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.m2 / self.count as f64
    }

    pub fn std(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Aggregate of one rate across evaluation seeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateSummary {
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub min: f64,
    pub max: f64,
    /// `std / mean`, absent when the mean is zero.
    pub cv: Option<f64>,
}

impl RateSummary {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return RateSummary::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        RateSummary {
            mean,
            std,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            cv: (mean != 0.0).then(|| std / mean),
        }
    }
}

/// Counters accumulated during training episodes only. Never the agent's
/// final performance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingRunStats {
    pub tally: OutcomeTally,
    pub final_epsilon: f64,
    pub states_learned: usize,
    pub elapsed_secs: f64,
    /// Absolute TD error of every applied update.
    pub td_error: RunningStats,
}

impl TrainingRunStats {
    pub fn episodes(&self) -> usize {
        self.tally.games
    }
}

/// Outcome of evaluation under one seed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeedStats {
    pub seed: u64,
    pub tally: OutcomeTally,
    pub win_rate: f64,
    pub draw_rate: f64,
    pub loss_rate: f64,
}

impl SeedStats {
    pub fn new(seed: u64, tally: OutcomeTally) -> Self {
        SeedStats {
            seed,
            win_rate: tally.win_rate(),
            draw_rate: tally.draw_rate(),
            loss_rate: tally.loss_rate(),
            tally,
        }
    }
}

/// Frozen-agent evaluation across independent seeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationStats {
    pub games_per_seed: usize,
    pub seeds: Vec<SeedStats>,
    /// All seeds pooled.
    pub total: OutcomeTally,
    pub win_rate: RateSummary,
    pub draw_rate: RateSummary,
    pub loss_rate: RateSummary,
}

impl EvaluationStats {
    pub fn from_seeds(games_per_seed: usize, seeds: Vec<SeedStats>) -> Self {
        let mut total = OutcomeTally::default();
        for s in &seeds {
            total.merge(&s.tally);
        }
        let rates = |f: fn(&SeedStats) -> f64| -> Vec<f64> { seeds.iter().map(f).collect() };
        EvaluationStats {
            games_per_seed,
            win_rate: RateSummary::from_values(&rates(|s| s.win_rate)),
            draw_rate: RateSummary::from_values(&rates(|s| s.draw_rate)),
            loss_rate: RateSummary::from_values(&rates(|s| s.loss_rate)),
            seeds,
            total,
        }
    }

    /// True when no evaluation game was played.
    pub fn is_empty(&self) -> bool {
        self.total.is_empty()
    }
}

/// Training metrics tracker with rolling window computations, for progress
/// logging.
pub struct TrainingMetrics {
    episode_results: VecDeque<EpisodeOutcome>,
    capacity: usize,
    total_episodes: usize, // lifetime count, never capped
}

impl TrainingMetrics {
    pub fn with_capacity(capacity: usize) -> Self {
        TrainingMetrics {
            episode_results: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            total_episodes: 0,
        }
    }

    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn record_episode(&mut self, result: EpisodeOutcome) {
        self.total_episodes += 1;
        self.episode_results.push_back(result);
        if self.episode_results.len() > self.capacity {
            self.episode_results.pop_front();
        }
    }

    fn rate_of(&self, last_n: usize, winner: EpisodeWinner) -> f64 {
        let n = self.episode_results.len().min(last_n);
        if n == 0 {
            return 0.0;
        }
        let hits = self
            .episode_results
            .iter()
            .rev()
            .take(n)
            .filter(|r| r.winner == winner)
            .count();
        hits as f64 / n as f64
    }

    /// Agent win rate in the last N episodes, as a fraction.
    pub fn win_rate(&self, last_n: usize) -> f64 {
        self.rate_of(last_n, EpisodeWinner::Agent)
    }

    /// Draw rate in the last N episodes, as a fraction.
    pub fn draw_rate(&self, last_n: usize) -> f64 {
        self.rate_of(last_n, EpisodeWinner::Draw)
    }

    /// Average game length over the last N episodes.
    pub fn average_game_length(&self, last_n: usize) -> f64 {
        let n = self.episode_results.len().min(last_n);
        if n == 0 {
            return 0.0;
        }
        let total: usize = self
            .episode_results
            .iter()
            .rev()
            .take(n)
            .map(|r| r.moves)
            .sum();
        total as f64 / n as f64
    }

    pub fn total_episodes(&self) -> usize {
        self.total_episodes
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new()
    }
}
