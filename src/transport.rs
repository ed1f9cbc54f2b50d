//! Transport abstraction shared by the chat client and server.
//!
//! The [`Transport`] trait defines a bidirectional text message channel
//! between one client and the relay. The protocol uses JSON text messages, so
//! every transport implementation must handle message framing internally
//! (e.g., WebSocket frames, length-prefixed TCP, QUIC streams).
//!
//! Connection *setup* is not part of [`Transport`] — different transports
//! have fundamentally different connection parameters (URLs for WebSocket,
//! host:port for TCP, QUIC endpoints). The [`Connector`] trait captures setup
//! instead: a reusable dialing recipe the client invokes for the initial
//! connection and again for every reconnect attempt.

use async_trait::async_trait;

use crate::error::ChatError;

/// A bidirectional text message transport between one client and the relay.
///
/// Implementors shuttle serialized JSON strings in both directions. Each call
/// to [`send`](Transport::send) transmits one complete JSON message; each
/// call to [`recv`](Transport::recv) returns one complete JSON message.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is
/// used inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data. Channel-based implementations (e.g.,
/// wrapping `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::TransportSend`] if the message could not be sent
    /// (e.g., connection broken, write buffer full).
    async fn send(&mut self, message: String) -> Result<(), ChatError>;

    /// Receive the next JSON text message from the peer.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete message was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed cleanly by the peer
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, ChatError>>;

    /// Close the transport connection gracefully.
    ///
    /// After calling this method, subsequent calls to [`send`](Transport::send)
    /// and [`recv`](Transport::recv) may return errors or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), ChatError>;
}

/// A factory that dials fresh [`Transport`] connections to one relay.
///
/// The client keeps the connector for the lifetime of the session and calls
/// [`connect`](Connector::connect) once per attempt — the initial connection,
/// every automatic reconnect, and manual retries after the budget is spent.
/// Attempts are never concurrent; the client awaits one dial at a time.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The transport type this connector produces.
    type Transport: Transport;

    /// Establish a new connection to the relay.
    ///
    /// # Errors
    ///
    /// Returns any [`ChatError`] the underlying dial produces; the caller
    /// decides whether to retry.
    async fn connect(&self) -> Result<Self::Transport, ChatError>;
}
