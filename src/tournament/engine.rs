use std::cmp::{Ordering, Reverse};
use std::collections::HashSet;
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;

use super::history::TournamentHistory;
use super::matches::play_match;
use super::{
    MatchResult, SkippedParticipant, Standing, TournamentConfig, TournamentFormat,
    TournamentReport, TournamentStatus,
};
use crate::ai::QLearningAgent;
use crate::checkpoint::CheckpointManager;
use crate::error::{ConfigError, EpisodeError, TournamentError};
use crate::game::{Game, StateKey};
use crate::rating::{MatchTally, RatingStore};
use crate::training::CancelToken;

/// A named agent entered into a tournament. Agents are only ever borrowed
/// through their frozen view while matches run.
#[derive(Debug, Clone)]
pub struct Participant<S> {
    pub id: String,
    pub agent: QLearningAgent<S>,
}

impl<S> Participant<S> {
    pub fn new(id: impl Into<String>, agent: QLearningAgent<S>) -> Self {
        Participant {
            id: id.into(),
            agent,
        }
    }
}

/// Load saved agents by id. Agents that fail to load, and repeated ids, are
/// logged and returned as skipped instead of failing the batch.
pub fn load_participants<S: StateKey>(
    manager: &CheckpointManager,
    ids: &[String],
) -> (Vec<Participant<S>>, Vec<SkippedParticipant>) {
    let mut seen = HashSet::new();
    let mut loaded = Vec::new();
    let mut skipped = Vec::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            skipped.push(SkippedParticipant {
                id: id.clone(),
                reason: "duplicate participant".to_string(),
            });
            continue;
        }
        match manager.load_agent(id) {
            Ok(agent) => loaded.push(Participant::new(id.clone(), agent)),
            Err(e) => {
                warn!("Skipping participant '{}': {}", id, e);
                skipped.push(SkippedParticipant {
                    id: id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    (loaded, skipped)
}

/// Matches, round count and champion produced by one format.
struct Bracket {
    matches: Vec<MatchResult>,
    rounds: usize,
    champion: Option<String>,
    cancelled: bool,
}

pub struct TournamentEngine<'a, G: Game> {
    game: &'a G,
    ratings: &'a RatingStore,
    config: TournamentConfig,
    cancel: CancelToken,
    history: Option<&'a TournamentHistory>,
}

impl<'a, G: Game> TournamentEngine<'a, G> {
    pub fn new(
        game: &'a G,
        ratings: &'a RatingStore,
        config: TournamentConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(TournamentEngine {
            game,
            ratings,
            config,
            cancel: CancelToken::new(),
            history: None,
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Append every finished report to `history`.
    pub fn with_history(mut self, history: &'a TournamentHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config(&self) -> &TournamentConfig {
        &self.config
    }

    /// Run the configured format. `skipped` is carried into the report.
    ///
    /// Cancellation is honoured between matches; whatever was already played
    /// (and rated) stays in the report, whose status becomes `Cancelled`.
    pub fn run(
        &self,
        participants: &[Participant<G::State>],
        skipped: Vec<SkippedParticipant>,
    ) -> Result<TournamentReport, TournamentError> {
        check_participants(participants)?;
        let started_at = chrono::Utc::now().to_rfc3339();
        let start = Instant::now();

        let seeds = self.seeds(participants);
        let mut standings: Vec<Standing> = participants
            .iter()
            .zip(&seeds)
            .map(|(p, &seed)| Standing::new(&p.id, seed))
            .collect();

        info!(
            "{} tournament: {} participants, {} games per match",
            self.config.format,
            participants.len(),
            self.config.games_per_match
        );

        let bracket = match self.config.format {
            TournamentFormat::RoundRobin => self.round_robin(participants, &mut standings),
            TournamentFormat::Elimination => self.elimination(participants, &mut standings),
        };

        for s in standings.iter_mut() {
            s.rating = self.ratings.rating(&s.id);
        }
        match self.config.format {
            TournamentFormat::RoundRobin => standings.sort_by(|a, b| {
                b.points
                    .cmp(&a.points)
                    .then_with(|| b.rating.total_cmp(&a.rating))
                    .then_with(|| a.id.cmp(&b.id))
            }),
            TournamentFormat::Elimination => standings
                .sort_by_key(|s| (Reverse(s.eliminated_in.unwrap_or(usize::MAX)), s.seed)),
        }
        for (i, s) in standings.iter_mut().enumerate() {
            s.rank = i + 1;
        }

        let champion = match (self.config.format, bracket.cancelled) {
            (_, true) => None,
            (TournamentFormat::RoundRobin, false) => standings.first().map(|s| s.id.clone()),
            (TournamentFormat::Elimination, false) => bracket.champion,
        };
        let status = if bracket.cancelled {
            warn!("Tournament cancelled after {} matches", bracket.matches.len());
            TournamentStatus::Cancelled
        } else {
            TournamentStatus::Complete
        };

        let mut report = TournamentReport {
            format: self.config.format,
            status,
            started_at,
            duration_secs: start.elapsed().as_secs_f64(),
            participants: participants.iter().map(|p| p.id.clone()).collect(),
            skipped,
            games_per_match: self.config.games_per_match,
            rounds: bracket.rounds,
            matches: bracket.matches,
            standings,
            champion,
            warnings: Vec::new(),
        };
        if let Some(champion) = &report.champion {
            info!("Champion: {}", champion);
        }
        if report.failed_matches() > 0 {
            warn!(
                "{} of {} matches failed",
                report.failed_matches(),
                report.matches.len()
            );
        }
        if report.unrated_matches() > 0 {
            let message = format!(
                "{} played matches could not be saved to the rating store",
                report.unrated_matches()
            );
            warn!("{}", message);
            report.warnings.push(message);
        }

        if let Some(history) = self.history {
            if let Err(e) = history.append(&report) {
                let message = format!(
                    "tournament history {} not updated: {}",
                    history.path().display(),
                    e
                );
                warn!("{}", message);
                report.warnings.push(message);
            }
        }
        Ok(report)
    }

    /// 1-based seed per participant: highest rating first, ties by id.
    fn seeds(&self, participants: &[Participant<G::State>]) -> Vec<usize> {
        let ratings: Vec<f64> = participants
            .iter()
            .map(|p| self.ratings.rating(&p.id))
            .collect();
        let mut order: Vec<usize> = (0..participants.len()).collect();
        order.sort_by(|&a, &b| {
            ratings[b]
                .total_cmp(&ratings[a])
                .then_with(|| participants[a].id.cmp(&participants[b].id))
        });
        let mut seeds = vec![0; participants.len()];
        for (pos, &idx) in order.iter().enumerate() {
            seeds[idx] = pos + 1;
        }
        seeds
    }

    /// Order `field` by current rating, highest first, ties by starting seed.
    fn reseed(
        &self,
        participants: &[Participant<G::State>],
        standings: &[Standing],
        field: &mut [usize],
    ) {
        let ratings: Vec<f64> = participants
            .iter()
            .map(|p| self.ratings.rating(&p.id))
            .collect();
        field.sort_by(|&a, &b| {
            ratings[b]
                .total_cmp(&ratings[a])
                .then_with(|| standings[a].seed.cmp(&standings[b].seed))
        });
    }

    /// Play every pair. `None` marks a pair skipped because of cancellation.
    fn play_pairs(
        &self,
        participants: &[Participant<G::State>],
        pairs: &[(usize, usize)],
    ) -> Vec<Option<Result<MatchTally, EpisodeError>>> {
        let games = self.config.games_per_match;
        let play = |&(a, b): &(usize, usize)| {
            if self.cancel.is_cancelled() {
                return None;
            }
            Some(play_match(
                self.game,
                participants[a].agent.frozen_view(),
                participants[b].agent.frozen_view(),
                games,
            ))
        };
        if self.config.parallel {
            pairs.par_iter().map(play).collect()
        } else {
            pairs.iter().map(play).collect()
        }
    }

    /// Apply one match outcome to ratings and game counts, in schedule order.
    fn commit(
        &self,
        round: usize,
        participants: &[Participant<G::State>],
        standings: &mut [Standing],
        (a, b): (usize, usize),
        outcome: Result<MatchTally, EpisodeError>,
    ) -> MatchResult {
        let (id_a, id_b) = (&participants[a].id, &participants[b].id);
        let mut result = MatchResult {
            round,
            player_a: id_a.clone(),
            player_b: id_b.clone(),
            tally: None,
            winner: None,
            rating_delta_a: None,
            rating_delta_b: None,
            error: None,
            forfeit: false,
            rating_error: None,
        };
        match outcome {
            Ok(tally) => {
                if self.config.update_ratings {
                    match self.ratings.record_match(id_a, id_b, tally) {
                        Ok(record) => {
                            result.rating_delta_a = Some(record.delta_a());
                            result.rating_delta_b = Some(record.delta_b());
                        }
                        Err(e) => {
                            warn!("Rating update {} vs {} not saved: {}", id_a, id_b, e);
                            result.rating_error = Some(e.to_string());
                        }
                    }
                }
                standings[a].record_games(&tally);
                standings[b].record_games(&tally.swapped());
                result.winner = match tally.a_wins.cmp(&tally.b_wins) {
                    Ordering::Greater => Some(id_a.clone()),
                    Ordering::Less => Some(id_b.clone()),
                    Ordering::Equal => None,
                };
                result.tally = Some(tally);
                info!(
                    "Round {} | {} vs {}: {}-{}-{}",
                    round, id_a, id_b, tally.a_wins, tally.draws, tally.b_wins
                );
            }
            Err(e) => {
                warn!("Match {} vs {} failed: {}", id_a, id_b, e);
                result.error = Some(e.to_string());
            }
        }
        result
    }

    fn round_robin(
        &self,
        participants: &[Participant<G::State>],
        standings: &mut [Standing],
    ) -> Bracket {
        let n = participants.len();
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .collect();
        let outcomes = self.play_pairs(participants, &pairs);

        let mut matches = Vec::with_capacity(pairs.len());
        let mut cancelled = false;
        for (&pair, outcome) in pairs.iter().zip(outcomes) {
            let Some(outcome) = outcome else {
                cancelled = true;
                break;
            };
            let result = self.commit(1, participants, standings, pair, outcome);
            if let Some(tally) = result.tally {
                let (a, b) = pair;
                match tally.a_wins.cmp(&tally.b_wins) {
                    Ordering::Greater => award(standings, a, b),
                    Ordering::Less => award(standings, b, a),
                    Ordering::Equal => {
                        for i in [a, b] {
                            standings[i].match_draws += 1;
                            standings[i].points += 1;
                        }
                    }
                }
            }
            matches.push(result);
        }
        Bracket {
            matches,
            rounds: 1,
            champion: None,
            cancelled,
        }
    }

    /// Single elimination, re-seeded by current rating every round (ties by
    /// starting seed). With an odd field the highest rated gets the bye; the
    /// others pair highest against lowest.
    fn elimination(
        &self,
        participants: &[Participant<G::State>],
        standings: &mut [Standing],
    ) -> Bracket {
        let mut remaining: Vec<usize> = (0..participants.len()).collect();
        remaining.sort_by_key(|&i| standings[i].seed);
        let mut matches = Vec::new();
        let mut round = 0;
        let mut cancelled = false;

        while remaining.len() > 1 {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            round += 1;
            let (bye, contenders) = if remaining.len() % 2 == 1 {
                (Some(remaining[0]), &remaining[1..])
            } else {
                (None, &remaining[..])
            };
            let pairs: Vec<(usize, usize)> = (0..contenders.len() / 2)
                .map(|k| (contenders[k], contenders[contenders.len() - 1 - k]))
                .collect();
            if let Some(i) = bye {
                debug!("Round {}: {} advances on a bye", round, participants[i].id);
            }

            let outcomes = self.play_pairs(participants, &pairs);
            let mut next: Vec<usize> = bye.into_iter().collect();
            for (&pair, outcome) in pairs.iter().zip(outcomes) {
                let Some(outcome) = outcome else {
                    cancelled = true;
                    break;
                };
                let (a, b) = pair;
                let mut result = self.commit(round, participants, standings, pair, outcome);
                let winner = match &result.tally {
                    Some(tally) => elimination_winner(standings, a, b, tally),
                    None => {
                        result.forfeit = true;
                        higher_seed(standings, a, b)
                    }
                };
                let loser = if winner == a { b } else { a };
                award(standings, winner, loser);
                standings[loser].eliminated_in = Some(round);
                result.winner = Some(participants[winner].id.clone());
                matches.push(result);
                next.push(winner);
            }
            if cancelled {
                break;
            }
            self.reseed(participants, standings, &mut next);
            remaining = next;
        }

        let champion = if cancelled {
            None
        } else {
            remaining.first().map(|&i| participants[i].id.clone())
        };
        Bracket {
            matches,
            rounds: round,
            champion,
            cancelled,
        }
    }
}

fn check_participants<S>(participants: &[Participant<S>]) -> Result<(), ConfigError> {
    if participants.len() < 2 {
        return Err(ConfigError::Validation(format!(
            "a tournament needs at least 2 participants, got {}",
            participants.len()
        )));
    }
    let mut seen = HashSet::new();
    for p in participants {
        if !seen.insert(p.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "participant '{}' entered twice",
                p.id
            )));
        }
    }
    Ok(())
}

fn award(standings: &mut [Standing], winner: usize, loser: usize) {
    standings[winner].match_wins += 1;
    standings[winner].points += 3;
    standings[loser].match_losses += 1;
}

fn higher_seed(standings: &[Standing], a: usize, b: usize) -> usize {
    if standings[a].seed <= standings[b].seed {
        a
    } else {
        b
    }
}

/// More game wins, else more draws over the tournament so far, else the
/// higher seed.
fn elimination_winner(standings: &[Standing], a: usize, b: usize, tally: &MatchTally) -> usize {
    match tally.a_wins.cmp(&tally.b_wins) {
        Ordering::Greater => a,
        Ordering::Less => b,
        Ordering::Equal => match standings[a].games_drawn.cmp(&standings[b].games_drawn) {
            Ordering::Greater => a,
            Ordering::Less => b,
            Ordering::Equal => higher_seed(standings, a, b),
        },
    }
}
