//! # Duel Kiosk Server
//!
//! Session orchestration for two-kiosk Minesweeper and WikiRace duels.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     DUEL KIOSK SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared rules (server and client)          │
//! │  ├── board.rs    - Dual-perspective board and flood reveal   │
//! │  ├── race.rs     - Navigation and end-of-race verdicts       │
//! │  ├── page.rs     - Encyclopedia page snapshots               │
//! │  ├── player.rs   - The two seats                             │
//! │  └── clock.rs    - Event timestamps                          │
//! │                                                              │
//! │  game/           - Server game engines                       │
//! │  ├── mines.rs    - Minesweeper race                          │
//! │  └── wiki.rs     - WikiRace                                  │
//! │                                                              │
//! │  network/        - Networking and the session pipeline       │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── queue.rs    - Single-worker mutation queue              │
//! │  ├── registry.rs - Seat-to-connection map                    │
//! │  ├── session.rs  - Session lifecycle and message routing     │
//! │  └── auth.rs     - Kiosk token check                         │
//! │                                                              │
//! │  oracle/         - External services behind async traits     │
//! │  client/         - Deterministic client reducers             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency Guarantee
//!
//! All game state is owned by one queue worker. Connection tasks, timers and
//! page fetches only enqueue mutations, so no two changes ever interleave,
//! even when a mutation waits on a slow oracle. Clients replay the resulting
//! event stream with the same `core` rules the server used.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod core;
pub mod error;
pub mod game;
pub mod network;
pub mod oracle;

// Re-export commonly used types
pub use crate::core::{Board, Player, WikiPage};
pub use error::AppError;
pub use network::{GameServer, ServerConfig};
pub use oracle::{OracleConfig, Services};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
