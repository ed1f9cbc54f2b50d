//! WebSocket front end for the chat relay.
//!
//! [`ChatServer`] binds a TCP listener and accepts WebSocket connections.
//! Each accepted connection gets two tasks: a reader that decodes text frames
//! into [`ClientEvent`]s and forwards them to the [`Room`] actor, and a
//! writer that drains the connection's outbound channel back into frames.
//! Neither task touches shared state; everything flows through the room's
//! command queue.
//!
//! Handler failures are contained per connection: a malformed frame is
//! logged and skipped, a broken connection tears down its own tasks, and the
//! accept loop keeps running either way.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ChatError, Result};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::room::{Room, RoomCommand};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 4000;

/// Default listen host (all interfaces).
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Listener configuration for [`ChatServer::bind`].
///
/// # Example
///
/// ```
/// use chat_relay::server::ServerConfig;
///
/// let config = ServerConfig::default().with_port(0); // ephemeral port
/// assert_eq!(config.host, "0.0.0.0");
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind. Use `0` to let the OS pick one (handy in tests).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Set the interface to bind.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port to bind.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// The chat relay server: one room, one listener.
///
/// [`bind`](Self::bind) spawns the room actor and claims the socket;
/// [`run`](Self::run) accepts connections until the task is dropped.
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() -> chat_relay::Result<()> {
/// use chat_relay::{ChatServer, ServerConfig};
///
/// let server = ChatServer::bind(ServerConfig::default()).await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug)]
pub struct ChatServer {
    listener: TcpListener,
    commands: mpsc::UnboundedSender<RoomCommand>,
}

impl ChatServer {
    /// Bind the listener and start the room actor.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Io`] when the address cannot be bound.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(Room::new(command_rx).run());

        info!(addr = %listener.local_addr()?, "chat relay listening");
        Ok(Self { listener, commands })
    }

    /// The address the listener is bound to. With port `0` in the config,
    /// this reveals the port the OS picked.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Io`] when the socket is gone.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever.
    ///
    /// Accept failures are logged and the loop continues; a single bad
    /// connection never takes the relay down. The future only resolves when
    /// the enclosing task is cancelled, so the signature keeps a `Result`
    /// solely for `?`-friendly call sites.
    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let commands = self.commands.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, commands).await {
                            warn!(%peer, error = %e, "connection handler failed");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                }
            }
        }
    }
}

/// Serve one client connection from handshake to teardown.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    commands: mpsc::UnboundedSender<RoomCommand>,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| ChatError::TransportReceive(e.to_string()))?;

    let id = Uuid::new_v4();
    debug!(%peer, connection = %id, "websocket accepted");

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerEvent>();
    if commands
        .send(RoomCommand::Connect {
            id,
            sender: outbound_tx,
        })
        .is_err()
    {
        // Room actor gone; nothing to serve.
        return Err(ChatError::TransportClosed);
    }

    let (mut sink, mut source) = ws.split();

    // Writer: outbound channel → text frames. Ends when the room drops the
    // sender (after processing Disconnect) or the socket breaks.
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if let Err(e) = sink.send(Message::Text(json.into())).await {
                        debug!(connection = %id, error = %e, "outbound write failed");
                        break;
                    }
                }
                Err(e) => {
                    // Serialization of our own types failing is a bug; skip
                    // the event rather than killing the connection.
                    error!(connection = %id, error = %e, "failed to serialize server event");
                }
            }
        }
        let _ = sink.close().await;
    });

    // Reader: text frames → room commands. One malformed event is logged and
    // skipped; it never terminates the connection, let alone the process.
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    if commands.send(RoomCommand::Inbound { id, event }).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(connection = %id, error = %e, "ignoring malformed client event");
                }
            },
            Ok(Message::Close(frame)) => {
                debug!(connection = %id, ?frame, "client sent close frame");
                break;
            }
            // tungstenite answers Pings itself; both control frames are noise here.
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(Message::Binary(_)) => {
                warn!(connection = %id, "ignoring unexpected binary frame");
            }
            Ok(Message::Frame(_)) => {
                debug!(connection = %id, "ignoring raw frame");
            }
            Err(e) => {
                debug!(connection = %id, error = %e, "websocket read failed");
                break;
            }
        }
    }

    let _ = commands.send(RoomCommand::Disconnect { id });
    debug!(%peer, connection = %id, "connection closed");

    // The Disconnect command makes the room drop our outbound sender, which
    // ends the writer task.
    let _ = writer.await;
    Ok(())
}
