//! Training infrastructure: episode runner, trainer state machine, frozen
//! multi-seed evaluation, run statistics and progress events.

pub mod episode;
pub mod evaluation;
pub mod metrics;
pub mod progress;
pub mod trainer;
pub mod transitions;

pub use episode::{
    agent_seat_for_episode, mix_seed, play_eval_episode, play_game, play_training_episode,
    EpisodeOutcome, EpisodeWinner, GameRecord, Opponent,
};
pub use evaluation::{evaluate, evaluate_seed, EvalPlan, EvaluationRun, SeedFailure};
pub use metrics::{
    EvaluationStats, MetricsSource, OutcomeTally, RateSummary, RunningStats, SeedStats,
    TrainingMetrics, TrainingRunStats,
};
pub use progress::{CancelToken, ProgressSnapshot, TrainingObserver, TrainingUpdate};
pub use trainer::{OpponentKind, Trainer, TrainerConfig, TrainerPhase, TrainingReport};
pub use transitions::{LearningLog, SampledTransition, TransitionSample};
