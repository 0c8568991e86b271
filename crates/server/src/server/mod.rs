//! Game server implementation.

use crate::config::Config;
use futures_util::{SinkExt, StreamExt};
use protocol::packets::{ClientMessage, ServerMessage};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};

pub mod client;
pub mod game;

pub use game::{run_game_loop, GameState};

/// Commands queued by connection tasks and applied by the game loop at
/// the next tick boundary.
#[derive(Debug, Clone)]
pub enum GameCommand {
    /// A socket completed the WebSocket handshake. Replies for this client
    /// go to `replies`.
    Connect {
        client_id: u32,
        addr: SocketAddr,
        replies: mpsc::UnboundedSender<ServerMessage>,
    },
    /// A well-formed message arrived.
    Message { client_id: u32, message: ClientMessage },
    /// The socket closed.
    Disconnect { client_id: u32 },
}

/// An encoded `state` frame, shared by every connection.
#[derive(Debug, Clone)]
pub struct StateBroadcast {
    pub tick: u64,
    pub payload: Utf8Bytes,
}

/// A reply for a single client.
#[derive(Debug, Clone)]
pub struct TargetedMessage {
    /// Target client ID.
    pub client_id: u32,
    pub message: ServerMessage,
}

/// Connection tracking state (shared across connection handlers).
struct ConnectionState {
    /// Number of connections per IP address.
    ip_connections: HashMap<IpAddr, usize>,
    /// Total number of connections.
    total_connections: usize,
    /// Next client ID to assign.
    next_client_id: u32,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            ip_connections: HashMap::new(),
            total_connections: 0,
            next_client_id: 1,
        }
    }

    /// Try to add a connection, returns its client ID if allowed.
    fn try_add_connection(&mut self, ip: IpAddr, max_total: usize, max_per_ip: usize) -> Option<u32> {
        // Check total connections
        if self.total_connections >= max_total {
            return None;
        }

        // Check per-IP limit
        let current = self.ip_connections.get(&ip).copied().unwrap_or(0);
        if current >= max_per_ip {
            return None;
        }

        *self.ip_connections.entry(ip).or_insert(0) += 1;
        self.total_connections += 1;

        let id = self.next_client_id;
        self.next_client_id = self.next_client_id.wrapping_add(1).max(1);
        Some(id)
    }

    /// Remove a connection.
    fn remove_connection(&mut self, ip: IpAddr) {
        if let Some(count) = self.ip_connections.get_mut(&ip) {
            if *count > 0 {
                *count -= 1;
                self.total_connections = self.total_connections.saturating_sub(1);
            }
            if *count == 0 {
                self.ip_connections.remove(&ip);
            }
        }
    }
}

/// Run the game server.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on ws://{}", addr);
    serve(listener, config).await
}

/// Serve WebSocket clients on an already bound listener.
pub async fn serve(listener: TcpListener, config: Config) -> anyhow::Result<()> {
    config.validate()?;

    // Connection tracking state
    let conn_state = Arc::new(RwLock::new(ConnectionState::new()));

    let (command_tx, command_rx) = mpsc::unbounded_channel::<GameCommand>();
    let (world_tx, _world_rx) = broadcast::channel::<StateBroadcast>(5);

    // Start the game loop; it owns the game state.
    let game = GameState::new(config.clone());
    tokio::spawn(run_game_loop(game, command_rx, world_tx.clone()));

    // Connection limits
    let max_connections = config.server.max_connections;
    let ip_limit = config.server.ip_limit;

    loop {
        let (stream, addr) = listener.accept().await?;
        let ip = addr.ip();

        let client_id = {
            let mut state = conn_state.write().await;
            match state.try_add_connection(ip, max_connections, ip_limit) {
                Some(id) => id,
                None => {
                    warn!("Connection rejected (limit reached): {}", addr);
                    continue;
                }
            }
        };

        let conn_state = Arc::clone(&conn_state);
        let command_tx = command_tx.clone();
        let world_rx = world_tx.subscribe();

        tokio::spawn(async move {
            let result = handle_connection(stream, addr, client_id, command_tx, world_rx).await;

            // Always remove from connection tracking when done
            {
                let mut state = conn_state.write().await;
                state.remove_connection(addr.ip());
            }

            if let Err(e) = result {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    client_id: u32,
    commands: mpsc::UnboundedSender<GameCommand>,
    mut world_rx: broadcast::Receiver<StateBroadcast>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New connection from {} (client {})", addr, client_id);

    let (mut write, mut read) = ws_stream.split();

    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerMessage>();
    commands
        .send(GameCommand::Connect { client_id, addr, replies: reply_tx })
        .map_err(|_| anyhow::anyhow!("game loop stopped"))?;

    loop {
        tokio::select! {
            // Handle incoming WebSocket messages
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match ClientMessage::parse(text.as_str()) {
                            Ok(message) => {
                                if commands.send(GameCommand::Message { client_id, message }).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Invalid message from client {} ({}): {}", client_id, addr, e),
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        warn!("Ignoring {}-byte binary frame from client {} ({})", data.len(), client_id, addr);
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} ({}) closed the connection", client_id, addr);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => {
                        break;
                    }
                    _ => {}
                }
            }
            // Handle world state broadcasts
            state = world_rx.recv() => {
                match state {
                    Ok(state) => {
                        if let Err(e) = write.send(Message::Text(state.payload)).await {
                            warn!("Failed to send state #{} to {}: {}", state.tick, addr, e);
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Client {} lagged, dropped {} snapshots", client_id, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            // Handle replies (init_ack)
            reply = reply_rx.recv() => {
                let Some(reply) = reply else {
                    break;
                };
                let text = match reply.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to encode reply for client {}: {}", client_id, e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::text(text)).await {
                    warn!("Failed to send reply to {}: {}", addr, e);
                    break;
                }
            }
        }
    }

    // Removal is applied by the game loop at the next tick boundary.
    let _ = commands.send(GameCommand::Disconnect { client_id });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_connection_limits() {
        let mut state = ConnectionState::new();
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        assert_eq!(state.try_add_connection(a, 3, 2), Some(1));
        assert_eq!(state.try_add_connection(a, 3, 2), Some(2));
        assert_eq!(state.try_add_connection(a, 3, 2), None, "per-IP limit");
        assert_eq!(state.try_add_connection(b, 3, 2), Some(3));
        assert_eq!(state.try_add_connection(b, 3, 2), None, "total limit");

        state.remove_connection(a);
        assert_eq!(state.try_add_connection(b, 3, 2), Some(4));
        assert_eq!(state.total_connections, 3);
    }
}
