//! Network Layer
//!
//! WebSocket server, wire protocol, and the single-writer session pipeline.
//! Connection tasks only parse and enqueue; all state lives behind the
//! mutation queue.

pub mod auth;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod server;
pub mod session;

pub use auth::{AuthConfig, AuthError};
pub use protocol::{
    AdminCommand, AdminResponse, ClientMessage, MineEvent, MineRequest, ServerMessage,
    WikiConfig, WikiEvent, WikiRequest,
};
pub use queue::{MutationQueue, Mutator};
pub use registry::{ConnectionId, ConnectionRegistry, RegistryError};
pub use server::{GameServer, GameServerError, ServerConfig};
pub use session::{Mutation, SessionConfig, SessionManager};
