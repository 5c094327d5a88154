use crate::ai::FrozenAgent;
use crate::error::EpisodeError;
use crate::game::{Game, Player};
use crate::rating::MatchTally;
use crate::training::play_game;

/// Play `games` greedy games between two frozen agents. A moves first in
/// even-numbered games and second in odd-numbered ones.
pub fn play_match<G: Game>(
    game: &G,
    a: FrozenAgent<'_, G::State>,
    b: FrozenAgent<'_, G::State>,
    games: usize,
) -> Result<MatchTally, EpisodeError> {
    let (mut a, mut b) = (a, b);
    let mut tally = MatchTally::default();
    for i in 0..games {
        let a_seat = Player::for_ply(i);
        let record = match a_seat {
            Player::X => play_game(game, &mut a, &mut b)?,
            Player::O => play_game(game, &mut b, &mut a)?,
        };
        match record.winner {
            Some(p) if p == a_seat => tally.a_wins += 1,
            Some(_) => tally.b_wins += 1,
            None => tally.draws += 1,
        }
    }
    Ok(tally)
}
