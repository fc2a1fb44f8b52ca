//! Core deterministic rules.
//!
//! Everything here is pure and shared by the server engines and the client
//! reducers, so both sides derive identical state from identical events.

pub mod board;
pub mod clock;
pub mod page;
pub mod player;
pub mod race;

// Re-export core types
pub use board::{Board, Cell, Outcome, Square, WinReason, DEATH_LIMIT};
pub use clock::{now_millis, Millis};
pub use page::{PageId, Section, WikiPage};
pub use player::Player;
pub use race::{EndReason, Racer};
