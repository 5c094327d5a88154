use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use super::episode::EpisodeOutcome;
use super::metrics::SeedStats;
use super::trainer::TrainerPhase;

/// Periodic metrics snapshot emitted at log intervals.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub episode: usize,
    pub total_episodes: usize,
    pub epsilon: f64,
    /// Rolling-window win rate, as a fraction.
    pub win_rate: f64,
    pub draw_rate: f64,
    pub avg_game_length: f64,
    pub states_learned: usize,
    pub episodes_per_sec: f64,
}

/// Updates a running trainer publishes to whoever presents them.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingUpdate {
    PhaseChanged(TrainerPhase),
    EpisodeCompleted {
        episode: usize,
        outcome: EpisodeOutcome,
        epsilon: f64,
    },
    Progress(ProgressSnapshot),
    EvalSeedCompleted {
        index: usize,
        total: usize,
        stats: SeedStats,
    },
}

/// Hook called by the trainer at episode and seed boundaries. Every method
/// defaults to doing nothing.
pub trait TrainingObserver {
    fn on_phase_changed(&mut self, _phase: TrainerPhase) {}

    fn on_episode_completed(&mut self, _episode: usize, _outcome: &EpisodeOutcome, _epsilon: f64) {}

    fn on_progress(&mut self, _snapshot: &ProgressSnapshot) {}

    fn on_eval_seed_completed(&mut self, _index: usize, _total: usize, _stats: &SeedStats) {}
}

/// Forwards every event over a channel. A disconnected receiver is ignored.
impl TrainingObserver for mpsc::Sender<TrainingUpdate> {
    fn on_phase_changed(&mut self, phase: TrainerPhase) {
        let _ = self.send(TrainingUpdate::PhaseChanged(phase));
    }

    fn on_episode_completed(&mut self, episode: usize, outcome: &EpisodeOutcome, epsilon: f64) {
        let _ = self.send(TrainingUpdate::EpisodeCompleted {
            episode,
            outcome: *outcome,
            epsilon,
        });
    }

    fn on_progress(&mut self, snapshot: &ProgressSnapshot) {
        let _ = self.send(TrainingUpdate::Progress(snapshot.clone()));
    }

    fn on_eval_seed_completed(&mut self, index: usize, total: usize, stats: &SeedStats) {
        let _ = self.send(TrainingUpdate::EvalSeedCompleted {
            index,
            total,
            stats: *stats,
        });
    }
}

/// Cooperative cancellation flag, checked at episode, seed, configuration and
/// match boundaries. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The shared flag, e.g. for a signal handler.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}
