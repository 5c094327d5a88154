//! ELO ratings: the pure update rule and a durable, mutex-guarded store.

mod elo;
mod store;

pub use elo::{
    expected_score, update_rating, update_rating_with_k, MatchTally, DEFAULT_K_FACTOR,
    INITIAL_RATING,
};
pub use store::{LeaderboardEntry, MatchRecord, RatingBook, RatingStats, RatingStore};
