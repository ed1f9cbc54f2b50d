//! Error types for the chat relay.

use thiserror::Error;

/// Errors that can occur when using the chat client or server.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the
    /// client is not connected. Messages rejected this way are dropped;
    /// resend once the connection is restored.
    #[error("not connected to server")]
    NotConnected,

    /// The display name is empty after trimming or longer than
    /// [`MAX_USERNAME_CHARS`](crate::protocol::MAX_USERNAME_CHARS) characters.
    #[error("display name must be non-empty and at most 50 characters")]
    InvalidName,

    /// The message text is empty after trimming or longer than
    /// [`MAX_MESSAGE_CHARS`](crate::protocol::MAX_MESSAGE_CHARS) characters.
    #[error("message text must be non-empty and at most 1000 characters")]
    InvalidMessage,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for chat relay operations.
pub type Result<T> = std::result::Result<T, ChatError>;
