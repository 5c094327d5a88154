use serde::{Deserialize, Serialize};

pub const DEFAULT_K_FACTOR: f64 = 32.0;
pub const INITIAL_RATING: f64 = 1500.0;

/// Expected score of a player rated `rating_a` against one rated `rating_b`.
pub fn expected_score(rating_a: f64, rating_b: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_b - rating_a) / 400.0))
}

/// New `(rating_a, rating_b)` after a match in which A scored `actual_a`
/// (1 win, 0.5 draw, 0 loss, or a fractional match score), with K = 32.
pub fn update_rating(rating_a: f64, rating_b: f64, actual_a: f64) -> (f64, f64) {
    update_rating_with_k(rating_a, rating_b, actual_a, DEFAULT_K_FACTOR)
}

pub fn update_rating_with_k(rating_a: f64, rating_b: f64, actual_a: f64, k: f64) -> (f64, f64) {
    let expected_a = expected_score(rating_a, rating_b);
    let expected_b = expected_score(rating_b, rating_a);
    let actual_a = actual_a.clamp(0.0, 1.0);
    (
        rating_a + k * (actual_a - expected_a),
        rating_b + k * ((1.0 - actual_a) - expected_b),
    )
}

/// Game counts of one match, seen from participant A.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTally {
    pub a_wins: usize,
    pub b_wins: usize,
    pub draws: usize,
}

impl MatchTally {
    pub fn games(&self) -> usize {
        self.a_wins + self.b_wins + self.draws
    }

    /// `(wins + 0.5 * draws) / games` for A; an empty match counts as even.
    pub fn score_a(&self) -> f64 {
        let games = self.games();
        if games == 0 {
            return 0.5;
        }
        (self.a_wins as f64 + 0.5 * self.draws as f64) / games as f64
    }

    pub fn swapped(&self) -> MatchTally {
        MatchTally {
            a_wins: self.b_wins,
            b_wins: self.a_wins,
            draws: self.draws,
        }
    }
}
