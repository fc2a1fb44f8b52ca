//! WebSocket Game Server
//!
//! Accepts kiosk connections and turns every frame into a queued mutation.
//! Connection tasks never touch game state: they parse, enqueue, and forward
//! whatever the session worker puts in their outbox.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::network::auth::AuthConfig;
use crate::network::protocol::{AdminCommand, AdminResponse, ClientMessage, ServerMessage};
use crate::network::queue::MutationQueue;
use crate::network::registry::outbox;
use crate::network::session::{Mutation, SessionConfig, SessionManager, DEFAULT_INACTIVITY};
use crate::oracle::Services;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Idle time before the current game is closed.
    pub inactivity: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
            max_connections: 16,
            inactivity: DEFAULT_INACTIVITY,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    ///
    /// `BIND_ADDR` wins over `PORT`; unparsable values fall back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(addr) = std::env::var("BIND_ADDR").ok().and_then(|v| v.parse().ok()) {
            config.bind_addr = addr;
        } else if let Some(port) = std::env::var("PORT").ok().and_then(|v| v.parse().ok()) {
            config.bind_addr.set_port(port);
        }

        if let Some(max) = std::env::var("MAX_CONNECTIONS").ok().and_then(|v| v.parse().ok()) {
            config.max_connections = max;
        }

        if let Some(secs) = std::env::var("GAME_INACTIVITY_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.inactivity = Duration::from_secs(secs);
        }

        config
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// Connected client bookkeeping.
struct ConnectedClient {
    /// Connection time.
    connected_at: Instant,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Session queue.
    queue: MutationQueue<Mutation>,
    /// Session worker.
    worker: JoinHandle<SessionManager>,
    /// Open connections.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server and start its session worker.
    pub fn new(config: ServerConfig, auth: AuthConfig, services: Services) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let session_config = SessionConfig {
            inactivity: config.inactivity,
        };
        let (queue, worker) = SessionManager::spawn(session_config, auth, services);

        Self {
            config,
            queue,
            worker,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let queue = self.queue.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = outbox();

            clients.write().await.insert(
                addr,
                ConnectedClient {
                    connected_at: Instant::now(),
                },
            );

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        if msg_tx.try_send(ServerMessage::error("malformed message")).is_err() {
                                            warn!("Outbox for {} is full, closing", addr);
                                            break;
                                        }
                                        continue;
                                    }
                                };
                                let mutation = Mutation::Inbound {
                                    conn: addr,
                                    reply: msg_tx.clone(),
                                    msg: client_msg,
                                };
                                if !queue.enqueue(mutation) {
                                    warn!("Session queue closed, dropping {}", addr);
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Cleanup
            sender_task.abort();
            queue.enqueue(Mutation::Disconnect { conn: addr });
            if let Some(client) = clients.write().await.remove(&addr) {
                info!(
                    "Connection {} closed after {:?}",
                    addr,
                    client.connected_at.elapsed()
                );
            }
        });
    }

    /// Run an administrative command through the session queue.
    pub async fn admin(&self, cmd: AdminCommand) -> AdminResponse {
        let (reply, response) = oneshot::channel();
        if !self.queue.enqueue(Mutation::Admin { cmd, reply }) {
            return AdminResponse::Error {
                message: Some("session worker stopped".into()),
            };
        }
        response.await.unwrap_or(AdminResponse::Error { message: None })
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Whether the session worker is still running.
    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }
}
