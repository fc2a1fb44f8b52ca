//! Minesweeper Client Reducer
//!
//! Replays the server's Minesweeper events into the same board the server
//! holds. Only clicked squares travel over the wire, so every expansion is
//! recomputed here with [`Board::reveal`].

use tracing::debug;

use crate::core::board::neighbors;
use crate::core::{Board, Millis, Player, Square, WinReason};
use crate::network::protocol::MineEvent;

/// Leaderboard entry earned by a speed win.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    /// Zero-based rank among runs of the same board size.
    pub idx: usize,
    /// Name given to the run.
    pub name: Option<String>,
}

/// Where a started game stands, from this kiosk's point of view.
#[derive(Clone, Debug, PartialEq)]
pub enum MineStatus {
    /// Still racing.
    Ongoing,
    /// Decided.
    Ended {
        /// Whether this kiosk won.
        won: bool,
        /// How it was decided.
        why: WinReason,
        /// Time of the deciding reveal.
        end: Millis,
        /// Set once the server recorded our time.
        leaderboard: Option<Placement>,
    },
}

/// A game with a board.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveMines {
    /// Number of mines requested.
    pub mine_count: usize,
    /// The shared board, both perspectives.
    pub board: Board,
    /// Opening square.
    pub start_square: Square,
    /// When the board was generated.
    pub start_time: Millis,
    /// Progress.
    pub status: MineStatus,
}

impl ActiveMines {
    /// Unflagged mines still unaccounted for around `square`, from `me`'s
    /// view, or `None` when every neighbour is already known.
    pub fn remaining_hint(&self, square: Square, me: Player) -> Option<i32> {
        let cell = self.board.cell(square)?;
        let idx = me.index();
        let mut remaining = i32::from(cell.number);
        let mut unknown = false;
        for n in neighbors(self.board.rows(), self.board.cols(), square) {
            let Some(neighbor) = self.board.cell(n) else {
                continue;
            };
            if neighbor.flagged[idx] || (neighbor.revealed[idx] && neighbor.mine) {
                remaining -= 1;
            } else if !neighbor.revealed[idx] {
                unknown = true;
            }
        }
        unknown.then_some(remaining)
    }
    /// Mine counter shown to `me`: mines minus flags, where a mine `me`
    /// revealed counts as flagged. Negative when over-flagged.
    pub fn mines_left(&self, me: Player) -> i64 {
        self.mine_count as i64 - self.board.flags_placed(me) as i64
    }
}

/// Client-side Minesweeper state.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum MineView {
    /// No game.
    #[default]
    Idle,
    /// Requested, waiting for the opening click.
    NotStarted {
        /// `(rows, cols)`.
        size: (usize, usize),
        /// Number of mines.
        mine_count: usize,
    },
    /// Board generated.
    Active(ActiveMines),
}

/// Fold one event into the view. `me` is this kiosk's seat.
pub fn reduce(state: MineView, event: &MineEvent, me: Player) -> MineView {
    match (state, event) {
        (MineView::Idle, MineEvent::GameRequest { size, mine_count }) => MineView::NotStarted {
            size: *size,
            mine_count: *mine_count,
        },

        (MineView::NotStarted { size, mine_count }, MineEvent::GameStart { game }) => {
            let board = Board::from_layout(&game.board).and_then(|mut board| {
                board.open(game.start_square)?;
                Ok(board)
            });
            match board {
                Ok(board) => MineView::Active(ActiveMines {
                    mine_count,
                    board,
                    start_square: game.start_square,
                    start_time: game.start_time,
                    status: MineStatus::Ongoing,
                }),
                Err(e) => {
                    debug!(error = %e, "unusable gameStart");
                    MineView::NotStarted { size, mine_count }
                }
            }
        }

        (
            MineView::Active(mut game),
            MineEvent::PlayerReveal { player, time, square },
        ) if game.status == MineStatus::Ongoing => {
            if game.board.reveal(*player, *square).is_ok() {
                if let Some(outcome) = game.board.outcome() {
                    game.status = MineStatus::Ended {
                        won: outcome.winner == me,
                        why: outcome.reason,
                        end: *time,
                        leaderboard: None,
                    };
                }
            }
            MineView::Active(game)
        }

        (MineView::Active(mut game), MineEvent::PlayerFlag { player, square, .. })
            if game.status == MineStatus::Ongoing =>
        {
            let _ = game.board.flag(*player, *square);
            MineView::Active(game)
        }

        (MineView::Active(mut game), MineEvent::TimeAdded { idx }) => {
            if let MineStatus::Ended { leaderboard, .. } = &mut game.status {
                *leaderboard = Some(Placement { idx: *idx, name: None });
            }
            MineView::Active(game)
        }

        (MineView::Active(mut game), MineEvent::TimeNameSet { name }) => {
            if let MineStatus::Ended { leaderboard: Some(placement), .. } = &mut game.status {
                placement.name = Some(name.clone());
            }
            MineView::Active(game)
        }

        (state, _) => state,
    }
}
