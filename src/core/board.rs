//! Dual-Perspective Minesweeper Board
//!
//! One grid, two players. Every cell tracks `revealed` and `flagged` once per
//! player (indexed by [`Player::index`]), so both players race on the same mine
//! layout without seeing each other's progress as their own.
//!
//! The server engine and the client reducer both call [`Board::reveal`]. The
//! wire only carries the clicked square, so the expansion here must stay the
//! single source of truth for what a click reveals.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::player::Player;

/// Deaths at which a player loses.
pub const DEATH_LIMIT: u32 = 2;

/// `(row, col)` coordinate.
pub type Square = (usize, usize);

/// A single board cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Cell holds a mine.
    pub mine: bool,
    /// Adjacent mine count (0..=8).
    pub number: u8,
    /// Revealed, per player.
    pub revealed: [bool; 2],
    /// Flagged, per player.
    pub flagged: [bool; 2],
}

/// Why a Minesweeper game ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WinReason {
    /// Opponent reached the death limit.
    Death,
    /// Winner cleared every safe cell first.
    Speed,
}

/// Decided result of a board.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outcome {
    /// Winning player.
    pub winner: Player,
    /// How the game was decided.
    pub reason: WinReason,
}

/// Summary of a single reveal action.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RevealReport {
    /// Cells newly revealed for the acting player.
    pub revealed: usize,
    /// The action uncovered at least one mine.
    pub hit_mine: bool,
}

/// Board construction and access errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    /// Board has no cells.
    #[error("board must have at least one row and one column")]
    Empty,
    /// Rows of a layout differ in length.
    #[error("board rows have different lengths")]
    Ragged,
    /// Coordinate lies outside the board.
    #[error("square {0:?} is outside the board")]
    OutOfBounds(Square),
    /// Mine layout places a mine on the opening square.
    #[error("opening square {0:?} holds a mine")]
    MineOnStart(Square),
}

/// Neighbours of `square` inside a `rows x cols` grid.
pub fn neighbors(rows: usize, cols: usize, (r, c): Square) -> impl Iterator<Item = Square> {
    (-1i64..=1)
        .flat_map(|dr| (-1i64..=1).map(move |dc| (dr, dc)))
        .filter(|&(dr, dc)| dr != 0 || dc != 0)
        .filter_map(move |(dr, dc)| {
            let nr = r as i64 + dr;
            let nc = c as i64 + dc;
            if nr >= 0 && nc >= 0 && (nr as usize) < rows && (nc as usize) < cols {
                Some((nr as usize, nc as usize))
            } else {
                None
            }
        })
}

/// Shared Minesweeper board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
    mine_count: usize,
    deaths: [u32; 2],
}

impl Board {
    /// Build a board from a list of mine coordinates.
    ///
    /// Duplicate coordinates count once.
    pub fn from_mines(rows: usize, cols: usize, mines: &[Square]) -> Result<Self, BoardError> {
        if rows == 0 || cols == 0 {
            return Err(BoardError::Empty);
        }
        let mut layout = vec![vec![false; cols]; rows];
        for &(r, c) in mines {
            if r >= rows || c >= cols {
                return Err(BoardError::OutOfBounds((r, c)));
            }
            layout[r][c] = true;
        }
        Self::from_layout(&layout)
    }

    /// Build a board from a `rows x cols` mine grid.
    pub fn from_layout(layout: &[Vec<bool>]) -> Result<Self, BoardError> {
        let rows = layout.len();
        let cols = layout.first().map(Vec::len).unwrap_or(0);
        if rows == 0 || cols == 0 {
            return Err(BoardError::Empty);
        }
        if layout.iter().any(|row| row.len() != cols) {
            return Err(BoardError::Ragged);
        }

        let mut cells = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                let number = neighbors(rows, cols, (r, c))
                    .filter(|&(a, b)| layout[a][b])
                    .count() as u8;
                cells.push(Cell {
                    mine: layout[r][c],
                    number,
                    ..Cell::default()
                });
            }
        }
        let mine_count = cells.iter().filter(|cell| cell.mine).count();

        Ok(Self {
            rows,
            cols,
            cells,
            mine_count,
            deaths: [0, 0],
        })
    }

    /// Reveal the opening square for both players.
    pub fn open(&mut self, start: Square) -> Result<(), BoardError> {
        let cell = self.cell(start).ok_or(BoardError::OutOfBounds(start))?;
        if cell.mine {
            return Err(BoardError::MineOnStart(start));
        }
        for player in Player::ALL {
            self.reveal(player, start)?;
        }
        Ok(())
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of mines on the board.
    pub fn mine_count(&self) -> usize {
        self.mine_count
    }

    /// Deaths suffered by `player`.
    pub fn deaths(&self, player: Player) -> u32 {
        self.deaths[player.index()]
    }

    /// Whether `square` lies on the board.
    pub fn contains(&self, (r, c): Square) -> bool {
        r < self.rows && c < self.cols
    }

    /// Cell at `square`.
    pub fn cell(&self, square: Square) -> Option<&Cell> {
        if self.contains(square) {
            self.cells.get(square.0 * self.cols + square.1)
        } else {
            None
        }
    }

    /// Mine grid, as broadcast in `gameStart`.
    pub fn layout(&self) -> Vec<Vec<bool>> {
        self.cells
            .chunks(self.cols)
            .map(|row| row.iter().map(|cell| cell.mine).collect())
            .collect()
    }

    #[inline]
    fn offset(&self, (r, c): Square) -> usize {
        r * self.cols + c
    }

    /// Reveal `square` from `player`'s perspective.
    ///
    /// Clicking an already revealed cell chords: its unflagged, unrevealed
    /// neighbours are revealed instead. Expansion continues through cells with
    /// no adjacent mines. A revealed mine becomes visible to both players, and
    /// the acting player's death counter rises by one per action no matter how
    /// many mines the action uncovered.
    pub fn reveal(&mut self, player: Player, square: Square) -> Result<RevealReport, BoardError> {
        if !self.contains(square) {
            return Err(BoardError::OutOfBounds(square));
        }
        let idx = player.index();
        let (rows, cols) = (self.rows, self.cols);

        let mut stack: Vec<Square> = Vec::new();
        if self.cells[self.offset(square)].revealed[idx] {
            stack.extend(neighbors(rows, cols, square).filter(|&n| {
                let cell = &self.cells[self.offset(n)];
                !cell.flagged[idx] && !cell.revealed[idx]
            }));
        } else {
            stack.push(square);
        }

        let mut marked = vec![false; self.cells.len()];
        let mut hit_mine = false;
        for &s in &stack {
            let at = self.offset(s);
            marked[at] = true;
            hit_mine |= self.cells[at].mine;
        }

        while let Some(s) = stack.pop() {
            let cell = &self.cells[self.offset(s)];
            if cell.number != 0 || cell.mine {
                continue;
            }
            for n in neighbors(rows, cols, s) {
                let at = self.offset(n);
                if !self.cells[at].revealed[idx] && !marked[at] {
                    marked[at] = true;
                    stack.push(n);
                }
            }
        }

        let mut revealed = 0;
        for (cell, _) in self.cells.iter_mut().zip(&marked).filter(|(_, m)| **m) {
            if !cell.revealed[idx] {
                revealed += 1;
            }
            if cell.mine {
                cell.revealed = [true, true];
            } else {
                cell.revealed[idx] = true;
            }
        }

        if hit_mine {
            self.deaths[idx] += 1;
        }

        Ok(RevealReport { revealed, hit_mine })
    }

    /// Toggle `player`'s flag on `square`.
    ///
    /// Flagging a cell the player already revealed is allowed.
    pub fn flag(&mut self, player: Player, square: Square) -> Result<(), BoardError> {
        if !self.contains(square) {
            return Err(BoardError::OutOfBounds(square));
        }
        let at = self.offset(square);
        let flag = &mut self.cells[at].flagged[player.index()];
        *flag = !*flag;
        Ok(())
    }

    /// Safe cells `player` has revealed.
    pub fn safe_revealed(&self, player: Player) -> usize {
        let idx = player.index();
        self.cells
            .iter()
            .filter(|cell| cell.revealed[idx] && !cell.mine)
            .count()
    }

    /// Flags placed by `player`, counting mines they revealed as flagged.
    pub fn flags_placed(&self, player: Player) -> usize {
        let idx = player.index();
        self.cells
            .iter()
            .filter(|cell| cell.flagged[idx] || (cell.revealed[idx] && cell.mine))
            .count()
    }

    /// `player` has revealed every safe cell.
    pub fn is_cleared(&self, player: Player) -> bool {
        self.safe_revealed(player) == self.rows * self.cols - self.mine_count
    }

    /// Current result, if decided. Deaths take precedence over clearing.
    pub fn outcome(&self) -> Option<Outcome> {
        for player in Player::ALL {
            if self.deaths(player) >= DEATH_LIMIT {
                return Some(Outcome {
                    winner: player.other(),
                    reason: WinReason::Death,
                });
            }
        }
        Player::ALL
            .into_iter()
            .find(|&player| self.is_cleared(player))
            .map(|winner| Outcome {
                winner,
                reason: WinReason::Speed,
            })
    }
}
