//! Protocol Messages
//!
//! Wire format for kiosk-server communication over WebSocket.
//! Every message is a JSON object tagged by `type`; game traffic nests a
//! second tagged object under `msg`.

use serde::{Deserialize, Serialize};

use crate::core::{Millis, Player, Square, WikiPage, EndReason};
use crate::oracle::{BoardSize, TimePage};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from a kiosk to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Bind this connection to a seat.
    Connect {
        /// Requested seat.
        player: Player,
        /// Shared kiosk password, if the server requires one.
        token: Option<String>,
    },

    /// End the current game.
    CloseGame,

    /// Minesweeper request.
    Mine {
        /// Request body.
        msg: MineRequest,
    },

    /// WikiRace request.
    Wiki {
        /// Request body.
        msg: WikiRequest,
    },
}

/// Minesweeper requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MineRequest {
    /// Propose a new game.
    StartGame {
        /// `(rows, cols)`.
        size: (usize, usize),
        /// Number of mines.
        #[serde(rename = "nMine")]
        mine_count: usize,
    },
    /// Reveal a square. `start` marks the opening click.
    Reveal {
        /// Target square.
        square: Square,
        /// Opening click.
        start: bool,
    },
    /// Toggle a flag.
    Flag {
        /// Target square.
        square: Square,
    },
    /// Leaderboard page, optionally for one board size.
    GetTimes {
        /// Size filter.
        size: Option<BoardSize>,
        /// Zero-based page.
        page: usize,
    },
    /// Name the caller's recorded run.
    SetTimeName {
        /// Display name.
        name: String,
    },
    /// Record the caller's winning run.
    AddTime,
}

/// WikiRace game options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WikiConfig {
    /// Game length in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u64>,
    /// Seconds within which both players must reach a new page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_interval: Option<u64>,
    /// Moving farther from the goal loses.
    pub only_closer: bool,
    /// Minimum start-to-goal distance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_distance: Option<u32>,
}

/// WikiRace requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WikiRequest {
    /// Pick start and goal pages.
    RequestStartEnd {
        /// Options for the game.
        game: WikiConfig,
    },
    /// Start the race.
    StartGame,
    /// Navigate to a page.
    Goto {
        /// Page title.
        name: String,
        /// Browser-style back navigation.
        back: bool,
        /// Fragment to scroll to.
        hash: Option<String>,
    },
    /// Give up.
    Stop,
    /// Abandon the in-flight navigation.
    StopLoading,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from the server to a kiosk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Seat bound.
    Connected {
        /// Bound seat.
        player: Player,
    },
    /// A password is required.
    NeedToken,
    /// Request failed. No message means an unknown error.
    Error {
        /// Human-readable reason.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// The current game was closed.
    GameEnd,
    /// Show (or clear) an operator banner.
    DisplayMessage {
        /// Banner text.
        message: Option<String>,
    },
    /// Reload the kiosk.
    Reset,
    /// Minesweeper event.
    Mine {
        /// Event body.
        msg: MineEvent,
    },
    /// WikiRace event.
    Wiki {
        /// Event body.
        msg: WikiEvent,
    },
}

impl ServerMessage {
    /// Error with a message.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error { message: Some(message.into()) }
    }
}

/// Board as broadcast when a Minesweeper game starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MineGameInfo {
    /// `(rows, cols)`.
    pub size: (usize, usize),
    /// Opening square.
    pub start_square: Square,
    /// Mine grid, row-major.
    pub board: Vec<Vec<bool>>,
    /// Board creation time.
    pub start_time: Millis,
}

/// Minesweeper events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MineEvent {
    /// A game was proposed; the board follows the opening click.
    GameRequest {
        /// `(rows, cols)`.
        size: (usize, usize),
        /// Number of mines.
        #[serde(rename = "nMine")]
        mine_count: usize,
    },
    /// The board exists and the opening square is revealed for both.
    GameStart {
        /// Board.
        game: MineGameInfo,
    },
    /// A player revealed a square.
    PlayerReveal {
        /// Actor.
        player: Player,
        /// Server timestamp.
        time: Millis,
        /// Square.
        square: Square,
    },
    /// A player toggled a flag.
    PlayerFlag {
        /// Actor.
        player: Player,
        /// Server timestamp.
        time: Millis,
        /// Square.
        square: Square,
    },
    /// Leaderboard page.
    LoadTimes(TimePage),
    /// The recipient's run was recorded at this rank.
    TimeAdded {
        /// Zero-based rank.
        idx: usize,
    },
    /// The recipient's run was named.
    TimeNameSet {
        /// Stored name.
        name: String,
    },
}

/// WikiRace events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WikiEvent {
    /// A player landed on a page.
    PlayerChange {
        /// Mover.
        player: Player,
        /// Requested title.
        name: String,
        /// Back navigation.
        back: bool,
        /// Distance to the goal, if reachable.
        distance: Option<u32>,
        /// Server timestamp.
        time: Millis,
    },
    /// Page for the recipient's navigation. `None` if it does not exist.
    PageContent {
        /// Page.
        page: Option<WikiPage>,
        /// Fragment to scroll to.
        hash: Option<String>,
    },
    /// The race started.
    GameStart {
        /// Start time.
        #[serde(rename = "startTime")]
        start_time: Millis,
    },
    /// Start page, goal page and one shortest path between them.
    SetStartEnd {
        /// Start page.
        start: WikiPage,
        /// Goal page.
        end: WikiPage,
        /// Pages strictly between start and goal.
        path: Vec<WikiPage>,
        /// Game options.
        game: WikiConfig,
    },
    /// The race ended.
    Stopped {
        /// Reason.
        why: EndReason,
        /// Player who stopped, reached the goal or died.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player: Option<Player>,
        /// Winner; absent for a draw or a stop.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner: Option<Player>,
        /// Server timestamp.
        time: Millis,
    },
    /// Endpoints are being selected.
    LoadingStartEnd,
    /// The recipient's page is being fetched.
    LoadingPage,
    /// Both players moved during the interval; a new one begins.
    TimeInterval {
        /// Server timestamp.
        time: Millis,
    },
    /// The recipient's navigation was abandoned.
    LoadingStopped,
}

// =============================================================================
// ADMIN
// =============================================================================

/// Kind of game in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    /// Minesweeper.
    Mine,
    /// WikiRace.
    Wiki,
}

/// Operator commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AdminCommand {
    /// Tell both kiosks to reload.
    Reset,
    /// Show or clear a banner.
    Message {
        /// Banner text.
        msg: Option<String>,
    },
    /// Report connections and the current game.
    Status,
}

/// Current game as reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStatus {
    /// Game kind.
    #[serde(rename = "type")]
    pub kind: GameKind,
    /// Creation time.
    pub start: Millis,
}

/// Operator command results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AdminResponse {
    /// Done.
    Ok,
    /// Failed.
    Error {
        /// Reason.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Live status.
    Status {
        /// Bound seats.
        players: Vec<Player>,
        /// Current game.
        game: Option<GameStatus>,
    },
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// =============================================================================
// TESTS
// =============================================================================
