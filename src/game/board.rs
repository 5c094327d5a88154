use serde::{Deserialize, Serialize};

pub const SIZE: usize = 3;
pub const CELLS: usize = SIZE * SIZE;

/// Every winning line as cell indices (rows, columns, diagonals).
pub const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    Empty,
    X,
    O,
}

/// 3x3 board, cells indexed row-major from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    cells: [Cell; CELLS],
}

impl Board {
    /// Create a new empty board
    pub fn new() -> Self {
        Board {
            cells: [Cell::Empty; CELLS],
        }
    }

    /// Get the cell at a board index. Out-of-range indices read as empty.
    pub fn get(&self, idx: usize) -> Cell {
        self.cells.get(idx).copied().unwrap_or(Cell::Empty)
    }

    pub fn is_free(&self, idx: usize) -> bool {
        idx < CELLS && self.cells[idx] == Cell::Empty
    }

    /// Place a mark; returns `false` if the index is out of range or taken.
    pub fn place(&mut self, idx: usize, cell: Cell) -> bool {
        if !self.is_free(idx) {
            return false;
        }
        self.cells[idx] = cell;
        true
    }

    /// Indices of empty cells in ascending order
    pub fn free_cells(&self) -> Vec<usize> {
        (0..CELLS).filter(|&idx| self.is_free(idx)).collect()
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|&c| c != Cell::Empty)
    }

    /// The mark owning a complete line, if any
    pub fn line_owner(&self) -> Option<Cell> {
        LINES.iter().find_map(|line| {
            let first = self.cells[line[0]];
            if first != Cell::Empty && line.iter().all(|&i| self.cells[i] == first) {
                Some(first)
            } else {
                None
            }
        })
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in 0..SIZE {
            let line: String = (0..SIZE)
                .map(|col| match self.cells[row * SIZE + col] {
                    Cell::Empty => '.',
                    Cell::X => 'X',
                    Cell::O => 'O',
                })
                .collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
