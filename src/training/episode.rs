use serde::{Deserialize, Serialize};

use crate::ai::{Policy, QLearningAgent, Transition};
use crate::error::EpisodeError;
use crate::game::{Action, Game, Player, StateKey};

use super::transitions::LearningLog;

/// Who won an episode, from the agent's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeWinner {
    Agent,
    Opponent,
    Draw,
}

/// Result of a single episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeOutcome {
    pub winner: EpisodeWinner,
    pub moves: usize,
    pub agent_seat: Player,
}

impl EpisodeOutcome {
    fn from_winner(winner: Option<Player>, agent_seat: Player, moves: usize) -> Self {
        let winner = match winner {
            Some(p) if p == agent_seat => EpisodeWinner::Agent,
            Some(_) => EpisodeWinner::Opponent,
            None => EpisodeWinner::Draw,
        };
        EpisodeOutcome {
            winner,
            moves,
            agent_seat,
        }
    }

    /// Episode return: win 1, draw 0, loss -1.
    pub fn agent_return(&self) -> f64 {
        match self.winner {
            EpisodeWinner::Agent => 1.0,
            EpisodeWinner::Draw => 0.0,
            EpisodeWinner::Opponent => -1.0,
        }
    }
}

/// Seat-level result of a game between two policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameRecord {
    pub winner: Option<Player>,
    pub moves: usize,
}

/// The other side during training.
pub enum Opponent<P> {
    /// The agent plays both seats and learns from both.
    SelfPlay,
    /// A fixed policy that never learns.
    Fixed(P),
}

/// Seat the agent takes in episode `episode_index`: even episodes move first.
pub fn agent_seat_for_episode(episode_index: usize) -> Player {
    Player::for_ply(episode_index)
}

fn seat_index(player: Player) -> usize {
    match player {
        Player::X => 0,
        Player::O => 1,
    }
}

fn learn<S: StateKey>(
    agent: &mut QLearningAgent<S>,
    log: &mut LearningLog<S>,
    transition: Transition<S>,
    next_legal: &[Action],
) {
    if let Some(td_error) = agent.update(&transition, next_legal) {
        log.record(transition, next_legal, td_error);
    }
}

/// Play one training episode, updating `agent` after every transition it
/// owns.
///
/// A learner's move is only resolved once the reply is known: if the game
/// goes on, it is updated with reward 0 against the state it faces next; if
/// the reply ends the game, it receives `-reward` for a loss or the shared
/// draw reward.
pub fn play_training_episode<G, P>(
    game: &G,
    agent: &mut QLearningAgent<G::State>,
    opponent: &mut Opponent<P>,
    agent_seat: Player,
    log: &mut LearningLog<G::State>,
) -> Result<EpisodeOutcome, EpisodeError>
where
    G: Game,
    P: Policy<G::State>,
{
    let self_play = matches!(opponent, Opponent::SelfPlay);
    let learns = |seat: Player| self_play || seat == agent_seat;

    let mut state = game.initial_state();
    let mut pending: [Option<(G::State, Action)>; 2] = [None, None];
    let mut moves = 0;

    loop {
        let mover = Player::for_ply(moves);
        let legal = game.legal_actions(&state);

        if let Some((s, a)) = pending[seat_index(mover)].take() {
            let transition = Transition {
                state: s,
                action: a,
                reward: 0.0,
                next_state: state.clone(),
                done: false,
            };
            learn(agent, log, transition, &legal);
        }

        let choice = if learns(mover) {
            agent.select_action(&state, &legal, true)
        } else {
            match opponent {
                Opponent::Fixed(policy) => policy.select_action(&state, &legal, false),
                Opponent::SelfPlay => agent.select_action(&state, &legal, true),
            }
        };
        let action = choice.ok_or(EpisodeError::NoLegalActions { moves })?;
        let step = game
            .step(&state, action)
            .map_err(|source| EpisodeError::Game { moves, source })?;
        moves += 1;

        if step.done {
            let other = mover.other();
            if learns(other) {
                if let Some((s, a)) = pending[seat_index(other)].take() {
                    let reward = if step.winner.is_some() {
                        -step.reward
                    } else {
                        step.reward
                    };
                    let transition = Transition {
                        state: s,
                        action: a,
                        reward,
                        next_state: step.next_state.clone(),
                        done: true,
                    };
                    learn(agent, log, transition, &[]);
                }
            }
            if learns(mover) {
                let transition = Transition {
                    state,
                    action,
                    reward: step.reward,
                    next_state: step.next_state,
                    done: true,
                };
                learn(agent, log, transition, &[]);
            }
            return Ok(EpisodeOutcome::from_winner(step.winner, agent_seat, moves));
        }

        if learns(mover) {
            pending[seat_index(mover)] = Some((state, action));
        }
        state = step.next_state;
    }
}

/// Play one game between two policies without any learning. `first` takes
/// `Player::X`.
pub fn play_game<G, A, B>(
    game: &G,
    first: &mut A,
    second: &mut B,
) -> Result<GameRecord, EpisodeError>
where
    G: Game,
    A: Policy<G::State> + ?Sized,
    B: Policy<G::State> + ?Sized,
{
    let mut state = game.initial_state();
    let mut moves = 0;
    loop {
        let legal = game.legal_actions(&state);
        let choice = match Player::for_ply(moves) {
            Player::X => first.select_action(&state, &legal, false),
            Player::O => second.select_action(&state, &legal, false),
        };
        let action = choice.ok_or(EpisodeError::NoLegalActions { moves })?;
        let step = game
            .step(&state, action)
            .map_err(|source| EpisodeError::Game { moves, source })?;
        moves += 1;
        if step.done {
            return Ok(GameRecord {
                winner: step.winner,
                moves,
            });
        }
        state = step.next_state;
    }
}

/// Play one evaluation game with `agent` in `agent_seat`.
pub fn play_eval_episode<G, A, B>(
    game: &G,
    agent: &mut A,
    opponent: &mut B,
    agent_seat: Player,
) -> Result<EpisodeOutcome, EpisodeError>
where
    G: Game,
    A: Policy<G::State> + ?Sized,
    B: Policy<G::State> + ?Sized,
{
    let record = match agent_seat {
        Player::X => play_game(game, agent, opponent)?,
        Player::O => play_game(game, opponent, agent)?,
    };
    Ok(EpisodeOutcome::from_winner(
        record.winner,
        agent_seat,
        record.moves,
    ))
}

/// Deterministic, well-distributed seed for unit `index` derived from
/// `base_seed`, mixed with FNV-1a style multiplies.
pub fn mix_seed(base_seed: u64, index: usize) -> u64 {
    let mut hash = base_seed ^ 0x517cc1b727220a95;
    let index = index as u64;
    hash = hash.wrapping_mul(0x100000001b3);
    hash ^= index;
    hash = hash.wrapping_mul(0x100000001b3);
    hash ^= index >> 32;
    hash
}
