//! Wire protocol types for the chat relay.
//!
//! Every message is one JSON text frame with an `{"event": ..., "data": ...}`
//! envelope. Server-to-client traffic uses two events: `message`, whose
//! payload carries an internal `type` tag (`message`/`join`/`leave`/`error`),
//! and `user_list`, a full roster snapshot that replaces any prior list.

use serde::{Deserialize, Serialize};

/// Maximum display name length, in characters (not bytes), after trimming.
pub const MAX_USERNAME_CHARS: usize = 50;

/// Maximum chat message length, in characters (not bytes), after trimming.
pub const MAX_MESSAGE_CHARS: usize = 1000;

// ── Messages ────────────────────────────────────────────────────────

/// Events sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Request a session under the given display name.
    Join { username: String },
    /// Request a broadcast. Requires an active session; the server silently
    /// drops sends from nameless connections.
    SendMessage { text: String },
}

/// Events sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A chat, presence, or error notification.
    Message(MessagePayload),
    /// Full roster snapshot in join order. Replaces any previous list.
    UserList { users: Vec<String> },
}

/// Payload of the `message` server event, discriminated by its `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    /// A chat line, broadcast to everyone including the author. The author
    /// recognizes its own messages by name equality, not by suppression.
    #[serde(rename = "message")]
    Chat { username: String, text: String },
    /// A user joined the chat.
    Join { username: String },
    /// A user left the chat.
    Leave { username: String },
    /// A rejection delivered only to the offending sender.
    Error { text: String },
}

// ── Validation ──────────────────────────────────────────────────────

/// Trim `raw` and return it when it is a valid display name
/// (1..=[`MAX_USERNAME_CHARS`] characters).
pub fn trimmed_username(raw: &str) -> Option<&str> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_USERNAME_CHARS {
        None
    } else {
        Some(name)
    }
}

/// Trim `raw` and return it when it is a valid chat message
/// (1..=[`MAX_MESSAGE_CHARS`] characters).
pub fn trimmed_message(raw: &str) -> Option<&str> {
    let text = raw.trim();
    if text.is_empty() || text.chars().count() > MAX_MESSAGE_CHARS {
        None
    } else {
        Some(text)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn username_is_trimmed() {
        assert_eq!(trimmed_username("  alice  "), Some("alice"));
    }

    #[test]
    fn blank_username_is_rejected() {
        assert_eq!(trimmed_username(""), None);
        assert_eq!(trimmed_username("   "), None);
    }

    #[test]
    fn username_limit_counts_characters_not_bytes() {
        // 50 multi-byte characters: 150 bytes but exactly at the limit.
        let name = "я".repeat(MAX_USERNAME_CHARS);
        assert!(name.len() > MAX_USERNAME_CHARS);
        assert_eq!(trimmed_username(&name), Some(name.as_str()));

        let too_long = "я".repeat(MAX_USERNAME_CHARS + 1);
        assert_eq!(trimmed_username(&too_long), None);
    }

    #[test]
    fn message_limit_boundary() {
        let at_limit = "x".repeat(MAX_MESSAGE_CHARS);
        assert_eq!(trimmed_message(&at_limit), Some(at_limit.as_str()));

        let over = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert_eq!(trimmed_message(&over), None);
    }
}
