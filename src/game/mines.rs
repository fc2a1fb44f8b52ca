//! Minesweeper Engine
//!
//! A game is requested with a size and mine count, but the board only exists
//! after the first opening click: the solver places mines around that square
//! so the opening is always safe. From then on every reveal and flag is
//! applied to the shared [`Board`] and broadcast as the clicked square only;
//! clients replay the expansion themselves.

use tracing::{debug, info, instrument};

use crate::core::clock::elapsed_secs;
use crate::core::{now_millis, Board, Millis, Outcome, Player, Square, WinReason};
use crate::error::AppError;
use crate::game::GameId;
use crate::network::protocol::{MineEvent, MineGameInfo, ServerMessage};
use crate::network::registry::ConnectionRegistry;
use crate::oracle::{BoardSize, OracleError, RecordId, Services};

/// Longest accepted leaderboard name, in characters.
pub const MAX_NAME_CHARS: usize = 15;

const BAD_BOARD: &str = "invalid board parameters";
const INVALID_STATE: &str = "invalid state";

/// Where the game stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MinePhase {
    /// Waiting for the opening click.
    NotStarted,
    /// Board live.
    Ongoing,
    /// Decided.
    Finished(Outcome),
}

#[derive(Clone, Copy, Debug)]
struct RunRecord {
    id: RecordId,
    named: bool,
}

/// One Minesweeper game.
pub struct MinesweeperGame {
    id: GameId,
    rows: usize,
    cols: usize,
    mine_count: usize,
    requested_at: Millis,
    started_at: Option<Millis>,
    start_square: Option<Square>,
    board: Option<Board>,
    outcome: Option<(Outcome, Millis)>,
    records: [Option<RunRecord>; 2],
}

fn mine(msg: MineEvent) -> ServerMessage {
    ServerMessage::Mine { msg }
}

impl MinesweeperGame {
    /// Requested game. At least one cell must stay free of mines.
    pub fn new(rows: usize, cols: usize, mine_count: usize, now: Millis) -> Result<Self, AppError> {
        let cells = rows.checked_mul(cols).unwrap_or(0);
        if cells == 0 || mine_count >= cells {
            return Err(AppError::domain(BAD_BOARD));
        }
        Ok(Self {
            id: GameId::new(),
            rows,
            cols,
            mine_count,
            requested_at: now,
            started_at: None,
            start_square: None,
            board: None,
            outcome: None,
            records: [None, None],
        })
    }

    /// Game id.
    pub fn id(&self) -> GameId {
        self.id
    }

    /// When the game was requested.
    pub fn requested_at(&self) -> Millis {
        self.requested_at
    }

    /// `(rows, cols)`.
    pub fn size(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Leaderboard bucket.
    pub fn board_size(&self) -> BoardSize {
        BoardSize(self.rows, self.cols, self.mine_count)
    }

    /// Board, once the opening click happened.
    pub fn board(&self) -> Option<&Board> {
        self.board.as_ref()
    }

    /// Opening square, once chosen.
    pub fn start_square(&self) -> Option<Square> {
        self.start_square
    }

    /// Current phase.
    pub fn phase(&self) -> MinePhase {
        match (&self.board, self.outcome) {
            (_, Some((outcome, _))) => MinePhase::Finished(outcome),
            (Some(_), None) => MinePhase::Ongoing,
            (None, None) => MinePhase::NotStarted,
        }
    }

    /// Handle a reveal. The first `start` click builds the board; later
    /// `start` clicks lost the race for it and are ignored.
    #[instrument(skip(self, registry, services), fields(game = %self.id))]
    pub async fn reveal(
        &mut self,
        player: Player,
        square: Square,
        start: bool,
        registry: &ConnectionRegistry,
        services: &Services,
    ) -> Result<(), AppError> {
        if self.board.is_none() {
            if !start {
                return Err(AppError::domain(INVALID_STATE));
            }
            return self.open(square, registry, services).await;
        }
        if start {
            debug!(%player, "late opening click ignored");
            return Ok(());
        }
        if self.outcome.is_some() {
            return Err(AppError::domain("game is over"));
        }

        let board = self
            .board
            .as_mut()
            .ok_or_else(|| AppError::Internal("board vanished".into()))?;
        let time = now_millis();
        let report = board
            .reveal(player, square)
            .map_err(|e| AppError::domain(e.to_string()))?;
        if report.hit_mine {
            info!(%player, deaths = board.deaths(player), "mine hit");
        }
        registry.broadcast(mine(MineEvent::PlayerReveal { player, time, square }));

        if let Some(outcome) = board.outcome() {
            self.finish(outcome, time, registry, services).await?;
        }
        Ok(())
    }

    async fn open(
        &mut self,
        square: Square,
        registry: &ConnectionRegistry,
        services: &Services,
    ) -> Result<(), AppError> {
        if square.0 >= self.rows || square.1 >= self.cols {
            return Err(AppError::domain(BAD_BOARD));
        }
        let mines = services
            .boards
            .generate(self.rows, self.cols, self.mine_count, square)
            .await
            .map_err(|e| AppError::oracle(BAD_BOARD, e))?;

        let mut board = Board::from_mines(self.rows, self.cols, &mines)
            .map_err(|e| AppError::oracle(BAD_BOARD, OracleError::Parse(e.to_string())))?;
        board
            .open(square)
            .map_err(|e| AppError::oracle(BAD_BOARD, OracleError::Parse(e.to_string())))?;

        let start_time = now_millis();
        info!(rows = self.rows, cols = self.cols, mines = board.mine_count(), ?square, "board generated");
        registry.broadcast(mine(MineEvent::GameStart {
            game: MineGameInfo {
                size: (self.rows, self.cols),
                start_square: square,
                board: board.layout(),
                start_time,
            },
        }));

        self.board = Some(board);
        self.start_square = Some(square);
        self.started_at = Some(start_time);
        Ok(())
    }

    /// Toggle a flag.
    pub fn flag(
        &mut self,
        player: Player,
        square: Square,
        registry: &ConnectionRegistry,
    ) -> Result<(), AppError> {
        if self.outcome.is_some() {
            return Err(AppError::domain("game is over"));
        }
        let board = self
            .board
            .as_mut()
            .ok_or_else(|| AppError::domain(INVALID_STATE))?;
        board
            .flag(player, square)
            .map_err(|e| AppError::domain(e.to_string()))?;
        registry.broadcast(mine(MineEvent::PlayerFlag {
            player,
            time: now_millis(),
            square,
        }));
        Ok(())
    }

    async fn finish(
        &mut self,
        outcome: Outcome,
        time: Millis,
        registry: &ConnectionRegistry,
        services: &Services,
    ) -> Result<(), AppError> {
        self.outcome = Some((outcome, time));
        info!(winner = %outcome.winner, reason = ?outcome.reason, "minesweeper decided");
        if outcome.reason == WinReason::Speed {
            self.record_run(outcome.winner, registry, services).await?;
        }
        Ok(())
    }

    /// Seconds from board creation to the deciding reveal.
    pub fn elapsed_secs(&self) -> Option<f64> {
        let started = self.started_at?;
        let (_, ended) = self.outcome?;
        Some(elapsed_secs(started, ended))
    }

    async fn record_run(
        &mut self,
        player: Player,
        registry: &ConnectionRegistry,
        services: &Services,
    ) -> Result<(), AppError> {
        let seconds = self
            .elapsed_secs()
            .ok_or_else(|| AppError::domain(INVALID_STATE))?;
        let size = self.board_size();
        let id = services.leaderboard.record_time(seconds, size).await?;
        let idx = services.leaderboard.rank_of(seconds, size).await?;
        self.records[player.index()] = Some(RunRecord { id, named: false });
        info!(%player, seconds, idx, "run recorded");
        registry.send_to(player, mine(MineEvent::TimeAdded { idx }));
        Ok(())
    }

    /// Record the caller's speed win if it is not recorded yet.
    pub async fn add_time(
        &mut self,
        player: Player,
        registry: &ConnectionRegistry,
        services: &Services,
    ) -> Result<(), AppError> {
        if self.records[player.index()].is_some() {
            return Err(AppError::domain(INVALID_STATE));
        }
        match self.outcome {
            Some((outcome, _)) if outcome.reason == WinReason::Speed && outcome.winner == player => {
                self.record_run(player, registry, services).await
            }
            _ => Err(AppError::domain(INVALID_STATE)),
        }
    }

    /// Name the caller's recorded run, once.
    pub async fn set_time_name(
        &mut self,
        player: Player,
        name: &str,
        registry: &ConnectionRegistry,
        services: &Services,
    ) -> Result<(), AppError> {
        let id = match self.records[player.index()] {
            Some(RunRecord { id, named: false }) => id,
            _ => return Err(AppError::domain(INVALID_STATE)),
        };
        let name = name.trim();
        let len = name.chars().count();
        if len == 0 || len > MAX_NAME_CHARS {
            return Err(AppError::domain(format!(
                "Name must be between 1 and {MAX_NAME_CHARS} characters"
            )));
        }
        if !services.leaderboard.set_name(id, name).await? {
            return Err(AppError::Internal(format!("record {id} missing from leaderboard")));
        }
        self.records[player.index()] = Some(RunRecord { id, named: true });
        registry.send_to(
            player,
            mine(MineEvent::TimeNameSet { name: name.to_string() }),
        );
        Ok(())
    }
}
