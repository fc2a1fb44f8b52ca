//! Game Engines
//!
//! The single current game and the two engines that can fill it. Engines own
//! their game state and emit events through the connection registry; they are
//! only ever driven from the mutation queue.
//!
//! ## Module Structure
//!
//! - `mines`: Minesweeper race on a shared board
//! - `wiki`: WikiRace with navigation tracking and timed variants

pub mod mines;
pub mod wiki;

use std::fmt;
use std::future::Future;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::network::protocol::{GameKind, GameStatus};

pub use mines::{MinePhase, MinesweeperGame};
pub use wiki::{WikiGame, WikiPhase};

/// Identity of one game. Timer mutations carry it so they can tell whether
/// the game they were armed for is still current.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GameId(Uuid);

impl GameId {
    /// Fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GameId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Background timer task, aborted when dropped.
#[derive(Debug)]
pub struct TimerGuard(JoinHandle<()>);

impl TimerGuard {
    /// Spawn `task` on the runtime.
    pub fn spawn<F>(task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(task))
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// The process-wide game slot.
#[derive(Default)]
pub enum Session {
    /// No game.
    #[default]
    Idle,
    /// Minesweeper in progress.
    Mines(MinesweeperGame),
    /// WikiRace in progress.
    Wiki(WikiGame),
}

impl Session {
    /// Id of the current game.
    pub fn id(&self) -> Option<GameId> {
        match self {
            Session::Idle => None,
            Session::Mines(game) => Some(game.id()),
            Session::Wiki(game) => Some(game.id()),
        }
    }

    /// Whether no game is installed.
    pub fn is_idle(&self) -> bool {
        matches!(self, Session::Idle)
    }

    /// Kind and creation time for status reports.
    pub fn status(&self) -> Option<GameStatus> {
        match self {
            Session::Idle => None,
            Session::Mines(game) => Some(GameStatus {
                kind: GameKind::Mine,
                start: game.requested_at(),
            }),
            Session::Wiki(game) => Some(GameStatus {
                kind: GameKind::Wiki,
                start: game.created_at(),
            }),
        }
    }
}
