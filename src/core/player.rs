//! Player Identity
//!
//! The two fixed seats of a duel. Serialized as `"one"` / `"two"`.

use serde::{Deserialize, Serialize};

/// One of the two kiosk seats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Player {
    /// First seat (index 0).
    One,
    /// Second seat (index 1).
    Two,
}

impl Player {
    /// Both seats in index order.
    pub const ALL: [Player; 2] = [Player::One, Player::Two];

    /// Array index for per-player state.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Player::One => 0,
            Player::Two => 1,
        }
    }

    /// The opposing seat.
    #[inline]
    pub const fn other(self) -> Player {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Player::One => "one",
            Player::Two => "two",
        }
    }
}

impl std::fmt::Display for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
