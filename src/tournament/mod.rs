//! Round-robin and single-elimination tournaments between frozen agents,
//! with ELO updates applied through a shared [`RatingStore`](crate::rating::RatingStore).

mod engine;
mod history;
mod matches;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rating::MatchTally;

pub use engine::{load_participants, Participant, TournamentEngine};
pub use history::TournamentHistory;
pub use matches::play_match;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentFormat {
    RoundRobin,
    Elimination,
}

impl std::fmt::Display for TournamentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TournamentFormat::RoundRobin => "round-robin",
            TournamentFormat::Elimination => "elimination",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentConfig {
    pub format: TournamentFormat,
    pub games_per_match: usize,
    pub update_ratings: bool,
    /// Play the matches of a round on the rayon pool.
    pub parallel: bool,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        TournamentConfig {
            format: TournamentFormat::RoundRobin,
            games_per_match: 100,
            update_ratings: true,
            parallel: true,
        }
    }
}

impl TournamentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.games_per_match < 1 {
            return Err(ConfigError::Validation(
                "tournament.games_per_match must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Pending,
    Running,
    Complete,
    Cancelled,
}

/// A participant that could not be loaded and was left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedParticipant {
    pub id: String,
    pub reason: String,
}

/// One scheduled pairing and what came of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// 1-based round; round-robin tournaments have a single round.
    pub round: usize,
    pub player_a: String,
    pub player_b: String,
    /// `None` when the match failed.
    pub tally: Option<MatchTally>,
    /// `None` for a drawn round-robin match or a failed one.
    pub winner: Option<String>,
    pub rating_delta_a: Option<f64>,
    pub rating_delta_b: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Winner advanced without the match deciding it.
    #[serde(default)]
    pub forfeit: bool,
    /// The match was played but its rating update could not be saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_error: Option<String>,
}

impl MatchResult {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub rank: usize,
    pub id: String,
    /// 1-based seed by rating at the start of the tournament.
    pub seed: usize,
    pub points: u32,
    pub match_wins: usize,
    pub match_draws: usize,
    pub match_losses: usize,
    pub games_won: usize,
    pub games_drawn: usize,
    pub games_lost: usize,
    pub rating: f64,
    /// Elimination only: the round this participant lost in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eliminated_in: Option<usize>,
}

impl Standing {
    fn new(id: &str, seed: usize) -> Self {
        Standing {
            id: id.to_string(),
            seed,
            ..Standing::default()
        }
    }

    fn record_games(&mut self, tally: &MatchTally) {
        self.games_won += tally.a_wins;
        self.games_drawn += tally.draws;
        self.games_lost += tally.b_wins;
    }
}

/// Full record of one tournament, as appended to the history file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentReport {
    pub format: TournamentFormat,
    pub status: TournamentStatus,
    /// RFC3339.
    pub started_at: String,
    pub duration_secs: f64,
    pub participants: Vec<String>,
    pub skipped: Vec<SkippedParticipant>,
    pub games_per_match: usize,
    pub rounds: usize,
    pub matches: Vec<MatchResult>,
    pub standings: Vec<Standing>,
    pub champion: Option<String>,
    /// Problems that did not stop the tournament, such as a history file
    /// that could not be written.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl TournamentReport {
    pub fn failed_matches(&self) -> usize {
        self.matches.iter().filter(|m| m.failed()).count()
    }

    pub fn completed_matches(&self) -> usize {
        self.matches.len() - self.failed_matches()
    }

    /// Played matches whose rating update was not saved.
    pub fn unrated_matches(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| m.rating_error.is_some())
            .count()
    }
}
