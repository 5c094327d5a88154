use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;
use serde::{Deserialize, Serialize};

use super::elo::{update_rating_with_k, MatchTally, DEFAULT_K_FACTOR, INITIAL_RATING};
use crate::checkpoint::{read_json, write_json_atomic};
use crate::error::PersistenceError;

/// One rated match, as kept in the store's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub timestamp: String,
    pub player_a: String,
    pub player_b: String,
    pub tally: MatchTally,
    pub score_a: f64,
    pub rating_a_before: f64,
    pub rating_b_before: f64,
    pub rating_a_after: f64,
    pub rating_b_after: f64,
}

impl MatchRecord {
    pub fn delta_a(&self) -> f64 {
        self.rating_a_after - self.rating_a_before
    }

    pub fn delta_b(&self) -> f64 {
        self.rating_b_after - self.rating_b_before
    }

    pub fn involves(&self, id: &str) -> bool {
        self.player_a == id || self.player_b == id
    }
}

/// On-disk layout of the rating store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingBook {
    pub ratings: BTreeMap<String, f64>,
    pub history: Vec<MatchRecord>,
    pub k_factor: f64,
    pub initial_rating: f64,
    pub updated_at: Option<String>,
}

impl Default for RatingBook {
    fn default() -> Self {
        RatingBook {
            ratings: BTreeMap::new(),
            history: Vec::new(),
            k_factor: DEFAULT_K_FACTOR,
            initial_rating: INITIAL_RATING,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub id: String,
    pub rating: f64,
    pub matches: usize,
    pub games_won: usize,
    pub games_drawn: usize,
    pub games_lost: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingStats {
    pub total_agents: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub top: Option<(String, f64)>,
}

/// Durable agent-id -> rating map plus match history.
///
/// Every read-modify-write goes through one mutex and, when the store is
/// file-backed, is persisted before the lock is released, so concurrent
/// match results for the same agent are applied one after another.
#[derive(Debug)]
pub struct RatingStore {
    path: Option<PathBuf>,
    book: Mutex<RatingBook>,
}

impl RatingStore {
    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        RatingStore {
            path: None,
            book: Mutex::new(RatingBook::default()),
        }
    }

    /// Open a file-backed store; a missing file starts an empty book.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let book = match read_json::<RatingBook>(&path) {
            Ok(book) => book,
            Err(PersistenceError::NotFound(_)) => RatingBook::default(),
            Err(e) => return Err(e),
        };
        debug!(
            "Opened rating store {} ({} agents, {} matches)",
            path.display(),
            book.ratings.len(),
            book.history.len()
        );
        Ok(RatingStore {
            path: Some(path),
            book: Mutex::new(book),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, RatingBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `change` to a copy of the book and save it; the copy replaces
    /// the book only once the save succeeded. An unchanged copy is not saved.
    fn update<T>(&self, change: impl FnOnce(&mut RatingBook) -> T) -> Result<T, PersistenceError> {
        let mut book = self.lock();
        let mut draft = book.clone();
        let out = change(&mut draft);
        if draft == *book {
            return Ok(out);
        }
        draft.updated_at = Some(chrono::Utc::now().to_rfc3339());
        if let Some(path) = &self.path {
            write_json_atomic(path, &draft)?;
        }
        *book = draft;
        Ok(out)
    }

    /// Current rating, or the initial rating for an unknown id.
    pub fn rating(&self, id: &str) -> f64 {
        let book = self.lock();
        book.ratings.get(id).copied().unwrap_or(book.initial_rating)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().ratings.contains_key(id)
    }

    pub fn ratings(&self) -> BTreeMap<String, f64> {
        self.lock().ratings.clone()
    }

    pub fn snapshot(&self) -> RatingBook {
        self.lock().clone()
    }

    /// Apply one match result to both ratings and append it to the history.
    /// Nothing changes, in memory or on disk, when the save fails.
    pub fn record_match(
        &self,
        player_a: &str,
        player_b: &str,
        tally: MatchTally,
    ) -> Result<MatchRecord, PersistenceError> {
        let record = self.update(|book| {
            let initial = book.initial_rating;
            let before_a = book.ratings.get(player_a).copied().unwrap_or(initial);
            let before_b = book.ratings.get(player_b).copied().unwrap_or(initial);
            let score_a = tally.score_a();
            let (after_a, after_b) =
                update_rating_with_k(before_a, before_b, score_a, book.k_factor);

            book.ratings.insert(player_a.to_string(), after_a);
            book.ratings.insert(player_b.to_string(), after_b);
            let record = MatchRecord {
                timestamp: chrono::Utc::now().to_rfc3339(),
                player_a: player_a.to_string(),
                player_b: player_b.to_string(),
                tally,
                score_a,
                rating_a_before: before_a,
                rating_b_before: before_b,
                rating_a_after: after_a,
                rating_b_after: after_b,
            };
            book.history.push(record.clone());
            record
        })?;

        debug!(
            "ELO {} {:.0} ({:+.1}) vs {} {:.0} ({:+.1})",
            player_a,
            record.rating_a_after,
            record.delta_a(),
            player_b,
            record.rating_b_after,
            record.delta_b()
        );
        Ok(record)
    }

    /// Register an agent at the initial rating if it is not rated yet.
    pub fn ensure(&self, id: &str) -> Result<f64, PersistenceError> {
        self.update(|book| {
            let initial = book.initial_rating;
            *book.ratings.entry(id.to_string()).or_insert(initial)
        })
    }

    /// Reset one agent (or every agent when `id` is `None`) to the initial rating.
    pub fn reset(&self, id: Option<&str>) -> Result<(), PersistenceError> {
        self.update(|book| {
            let initial = book.initial_rating;
            match id {
                Some(id) => {
                    if let Some(r) = book.ratings.get_mut(id) {
                        *r = initial;
                    }
                }
                None => {
                    for r in book.ratings.values_mut() {
                        *r = initial;
                    }
                    book.history.clear();
                }
            }
        })
    }

    /// Drop an agent's rating. History entries are kept.
    pub fn remove(&self, id: &str) -> Result<bool, PersistenceError> {
        self.update(|book| book.ratings.remove(id).is_some())
    }

    /// Rated agents, best first. Equal ratings are ordered by id.
    pub fn leaderboard(&self, top_n: Option<usize>) -> Vec<LeaderboardEntry> {
        let book = self.lock();
        let mut rows: Vec<(&String, f64)> = book.ratings.iter().map(|(k, &v)| (k, v)).collect();
        rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        rows.into_iter()
            .take(top_n.unwrap_or(usize::MAX))
            .enumerate()
            .map(|(i, (id, rating))| {
                let mut entry = LeaderboardEntry {
                    rank: i + 1,
                    id: id.clone(),
                    rating,
                    matches: 0,
                    games_won: 0,
                    games_drawn: 0,
                    games_lost: 0,
                };
                for m in book.history.iter().filter(|m| m.involves(id)) {
                    let tally = if &m.player_a == id {
                        m.tally
                    } else {
                        m.tally.swapped()
                    };
                    entry.matches += 1;
                    entry.games_won += tally.a_wins;
                    entry.games_drawn += tally.draws;
                    entry.games_lost += tally.b_wins;
                }
                entry
            })
            .collect()
    }

    /// Most recent matches first, optionally only those involving `id`.
    pub fn history(&self, id: Option<&str>, limit: usize) -> Vec<MatchRecord> {
        let book = self.lock();
        book.history
            .iter()
            .rev()
            .filter(|m| id.map_or(true, |id| m.involves(id)))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> RatingStats {
        let book = self.lock();
        if book.ratings.is_empty() {
            return RatingStats {
                total_agents: 0,
                mean: 0.0,
                min: 0.0,
                max: 0.0,
                top: None,
            };
        }
        let values: Vec<f64> = book.ratings.values().copied().collect();
        let top = book
            .ratings
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(k, &v)| (k.clone(), v));
        RatingStats {
            total_agents: values.len(),
            mean: values.iter().sum::<f64>() / values.len() as f64,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            top,
        }
    }
}
