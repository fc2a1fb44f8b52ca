//! Connection Registry
//!
//! Maps each seat to the one live connection bound to it. Only the queue
//! worker touches the registry, so it needs no locking.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::core::Player;
use crate::network::protocol::ServerMessage;

/// Connection identity (the peer address).
pub type ConnectionId = SocketAddr;

/// Messages a connection may have waiting before its seat is released.
pub const OUTBOX_CAPACITY: usize = 64;

/// Outbound message channel of one connection. Writes never wait; a full
/// outbox marks the connection as stalled.
pub type Outbox = mpsc::Sender<ServerMessage>;

/// Fresh outbox and its receiving end.
pub fn outbox() -> (Outbox, mpsc::Receiver<ServerMessage>) {
    mpsc::channel(OUTBOX_CAPACITY)
}

fn deliver(player: Player, outbox: &Outbox, msg: ServerMessage) {
    match outbox.try_send(msg) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => warn!(%player, "outbox full, message dropped"),
        Err(TrySendError::Closed(_)) => debug!(%player, "dropping message for closed connection"),
    }
}

/// Registration failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// This connection already holds a seat.
    #[error("already set a player")]
    AlreadyBound,
    /// Another connection holds the seat.
    #[error("player already in use")]
    InUse(Player),
}

struct Binding {
    conn: ConnectionId,
    outbox: Outbox,
}

/// Seat-to-connection map.
#[derive(Default)]
pub struct ConnectionRegistry {
    seats: BTreeMap<Player, Binding>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `conn` to `player`.
    pub fn register(
        &mut self,
        player: Player,
        conn: ConnectionId,
        outbox: Outbox,
    ) -> Result<(), RegistryError> {
        if self.player_of(conn).is_some() {
            return Err(RegistryError::AlreadyBound);
        }
        if self.seats.contains_key(&player) {
            return Err(RegistryError::InUse(player));
        }
        self.seats.insert(player, Binding { conn, outbox });
        info!(%player, %conn, "seat bound");
        Ok(())
    }

    /// Release whatever seat `conn` holds.
    pub fn unregister(&mut self, conn: ConnectionId) -> Option<Player> {
        let player = self.player_of(conn)?;
        self.seats.remove(&player);
        info!(%player, %conn, "seat released");
        Some(player)
    }

    /// Seat bound to `conn`.
    pub fn player_of(&self, conn: ConnectionId) -> Option<Player> {
        self.seats
            .iter()
            .find(|(_, binding)| binding.conn == conn)
            .map(|(player, _)| *player)
    }

    /// Bound seats in order.
    pub fn players(&self) -> Vec<Player> {
        self.seats.keys().copied().collect()
    }

    /// Number of bound seats.
    pub fn len(&self) -> usize {
        self.seats.len()
    }

    /// Whether no seat is bound.
    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    /// Send to every bound seat.
    pub fn broadcast(&self, msg: ServerMessage) {
        for (player, binding) in &self.seats {
            deliver(*player, &binding.outbox, msg.clone());
        }
    }

    /// Send to one seat. No-op if it is unbound.
    pub fn send_to(&self, player: Player, msg: ServerMessage) {
        if let Some(binding) = self.seats.get(&player) {
            deliver(player, &binding.outbox, msg);
        }
    }

    /// Unbind every seat whose outbox is full. The seat can be taken again
    /// once the kiosk reconnects.
    pub fn release_stalled(&mut self) -> Vec<Player> {
        let stalled: Vec<Player> = self
            .seats
            .iter()
            .filter(|(_, binding)| binding.outbox.capacity() == 0)
            .map(|(player, _)| *player)
            .collect();
        for player in &stalled {
            if let Some(binding) = self.seats.remove(player) {
                warn!(%player, conn = %binding.conn, "stalled connection released");
            }
        }
        stalled
    }
}

/// Registry with both seats bound to local channels.
#[cfg(test)]
pub(crate) fn seated() -> (ConnectionRegistry, [mpsc::Receiver<ServerMessage>; 2]) {
    let mut registry = ConnectionRegistry::new();
    let (tx1, rx1) = outbox();
    let (tx2, rx2) = outbox();
    let _ = registry.register(Player::One, SocketAddr::from(([127, 0, 0, 1], 9001)), tx1);
    let _ = registry.register(Player::Two, SocketAddr::from(([127, 0, 0, 1], 9002)), tx2);
    (registry, [rx1, rx2])
}

/// Everything currently waiting in `rx`.
#[cfg(test)]
pub(crate) fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}
