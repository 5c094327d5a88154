use serde::{Deserialize, Serialize};

use super::{Action, Board, Cell, Game, Player, Step};
use crate::error::GameError;

pub const WIN_REWARD: f64 = 1.0;
pub const DRAW_REWARD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    Winner(Player),
    Draw,
}

/// Board plus side to move. Immutable once observed; moves produce a new
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameState {
    board: Board,
    to_move: Player,
}

impl GameState {
    /// Create initial game state
    pub fn initial() -> Self {
        GameState {
            board: Board::new(),
            to_move: Player::X,
        }
    }

    pub fn current_player(&self) -> Player {
        self.to_move
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Get game outcome if game is over
    pub fn outcome(&self) -> Option<GameOutcome> {
        match self.board.line_owner() {
            Some(Cell::X) => Some(GameOutcome::Winner(Player::X)),
            Some(Cell::O) => Some(GameOutcome::Winner(Player::O)),
            _ if self.board.is_full() => Some(GameOutcome::Draw),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }

    /// Empty cells, or nothing once the game is over
    pub fn legal_actions(&self) -> Vec<Action> {
        if self.is_terminal() {
            return Vec::new();
        }
        self.board.free_cells()
    }

    /// Apply a move and return new state (immutable)
    pub fn apply_move(&self, action: Action) -> Result<GameState, GameError> {
        if self.is_terminal() {
            return Err(GameError::GameOver);
        }
        let mut board = self.board;
        if !board.place(action, self.to_move.to_cell()) {
            return Err(GameError::IllegalAction {
                action,
                legal: self.legal_actions(),
            });
        }
        Ok(GameState {
            board,
            to_move: self.to_move.other(),
        })
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::initial()
    }
}

/// Reference 3x3 tic-tac-toe. Rewards: win 1.0, draw 0.5, otherwise 0.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct TicTacToe;

impl Game for TicTacToe {
    type State = GameState;

    fn initial_state(&self) -> GameState {
        GameState::initial()
    }

    fn legal_actions(&self, state: &GameState) -> Vec<Action> {
        state.legal_actions()
    }

    fn step(&self, state: &GameState, action: Action) -> Result<Step<GameState>, GameError> {
        let next_state = state.apply_move(action)?;
        let (reward, done, winner) = match next_state.outcome() {
            Some(GameOutcome::Winner(p)) => (WIN_REWARD, true, Some(p)),
            Some(GameOutcome::Draw) => (DRAW_REWARD, true, None),
            None => (0.0, false, None),
        };
        Ok(Step {
            next_state,
            reward,
            done,
            winner,
        })
    }
}
