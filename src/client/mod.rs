//! Client Reducers
//!
//! Pure state machines that replay the server's event stream on a kiosk.
//! They share the board and race rules in `core` with the server engines, so
//! both kiosks and the server agree on every cell and every verdict.
//!
//! ## Module Structure
//!
//! - `mines`: Minesweeper board replay and win evaluation
//! - `wiki`: WikiRace navigation replay and end states

pub mod mines;
pub mod wiki;

use std::mem;

use crate::core::Player;
use crate::network::protocol::{MineEvent, ServerMessage};
use crate::oracle::TimePage;

pub use mines::{ActiveMines, MineStatus, MineView, Placement};
pub use wiki::{ActiveRace, CurrentPage, RaceSetup, RaceStatus, WikiView};

/// Text shown for an error without a message.
pub const UNKNOWN_ERROR: &str = "unknown error";

/// Everything one kiosk knows, rebuilt from server messages alone.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientView {
    /// Seat this kiosk asked for; confirmed once `connected` arrives.
    pub me: Player,
    /// Server accepted the seat.
    pub connected: bool,
    /// Server wants a password.
    pub needs_token: bool,
    /// Minesweeper state.
    pub mines: MineView,
    /// WikiRace state.
    pub wiki: WikiView,
    /// Last leaderboard page fetched.
    pub times: Option<TimePage>,
    /// Operator message.
    pub banner: Option<String>,
    /// Most recent error.
    pub last_error: Option<String>,
    /// Operator asked the kiosk to reload.
    pub reset_requested: bool,
}

impl ClientView {
    /// Fresh view for the kiosk sitting at `me`.
    pub fn new(me: Player) -> Self {
        Self {
            me,
            connected: false,
            needs_token: false,
            mines: MineView::Idle,
            wiki: WikiView::Idle,
            times: None,
            banner: None,
            last_error: None,
            reset_requested: false,
        }
    }

    /// Fold one server message into the view.
    pub fn apply(&mut self, msg: &ServerMessage) {
        match msg {
            ServerMessage::Connected { player } => {
                self.me = *player;
                self.connected = true;
                self.needs_token = false;
            }
            ServerMessage::NeedToken => self.needs_token = true,
            ServerMessage::Error { message } => {
                self.last_error = Some(message.clone().unwrap_or_else(|| UNKNOWN_ERROR.to_string()));
            }
            ServerMessage::GameEnd => {
                self.mines = MineView::Idle;
                self.wiki = WikiView::Idle;
            }
            ServerMessage::DisplayMessage { message } => self.banner = message.clone(),
            ServerMessage::Reset => {
                self.reset_requested = true;
                self.mines = MineView::Idle;
                self.wiki = WikiView::Idle;
            }
            ServerMessage::Mine { msg: MineEvent::LoadTimes(page) } => {
                self.times = Some(page.clone());
            }
            ServerMessage::Mine { msg } => {
                self.mines = mines::reduce(mem::take(&mut self.mines), msg, self.me);
            }
            ServerMessage::Wiki { msg } => {
                self.wiki = wiki::reduce(mem::take(&mut self.wiki), msg, self.me);
            }
        }
    }
}
