//! Game collaborator: the `Game` trait the training pipeline drives, and the
//! reference tic-tac-toe implementation with immutable state transitions.

mod board;
mod player;
mod state;

use std::fmt::Debug;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::GameError;

pub use board::{Board, Cell, CELLS, LINES, SIZE};
pub use player::Player;
pub use state::{GameOutcome, GameState, TicTacToe};

/// Index into the move set of a game.
pub type Action = usize;

/// Bounds a game state must satisfy to key the action-value table and be
/// persisted alongside it.
pub trait StateKey:
    Clone + Eq + Hash + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> StateKey for T where
    T: Clone + Eq + Hash + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// Result of applying one action.
///
/// `reward` is from the point of view of the player who just moved.
#[derive(Debug, Clone, PartialEq)]
pub struct Step<S> {
    pub next_state: S,
    pub reward: f64,
    pub done: bool,
    pub winner: Option<Player>,
}

/// A turn-based two-player game. Seats alternate every move, `Player::X`
/// moving first.
pub trait Game: Send + Sync {
    type State: StateKey;

    fn initial_state(&self) -> Self::State;

    /// Legal actions in ascending order. Empty for terminal states.
    fn legal_actions(&self, state: &Self::State) -> Vec<Action>;

    /// Apply `action` for the player to move.
    fn step(&self, state: &Self::State, action: Action) -> Result<Step<Self::State>, GameError>;
}
