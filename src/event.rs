//! Client-facing events emitted by [`ChatClient`](crate::client::ChatClient).
//!
//! [`ChatEvent`] is the single ordered stream a presentation layer consumes:
//! server traffic mapped 1:1 from [`ServerEvent`], plus synthetic lifecycle
//! events produced by the client itself (connection established, lost,
//! reconnect progress).

use crate::protocol::{MessagePayload, ServerEvent};

/// An event delivered on the channel returned by
/// [`ChatClient::connect`](crate::client::ChatClient::connect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The transport connection is established. Always the first event.
    Connected,
    /// The connection ended and no further reconnect will be attempted.
    /// Always the last event before the channel closes on shutdown.
    Disconnected {
        /// Why the connection ended, when known.
        reason: Option<String>,
    },
    /// The connection dropped mid-session; automatic reconnection follows.
    ConnectionLost {
        /// The transport error that severed the connection, when known.
        reason: Option<String>,
    },
    /// A reconnect attempt is about to be made.
    Reconnecting {
        /// 1-based attempt counter.
        attempt: u32,
        /// Total attempts in the retry budget.
        max_attempts: u32,
    },
    /// A reconnect attempt succeeded and the session is usable again. If a
    /// display name had been chosen it has been replayed to the server; the
    /// replay can still be refused (see [`ChatEvent::ServerError`]).
    Reconnected,
    /// The retry budget is exhausted. The client stays disconnected until
    /// [`join`](crate::client::ChatClient::join) is called again.
    ReconnectFailed {
        /// Number of attempts that were made.
        attempts: u32,
    },
    /// A chat line from any participant, the local user included.
    Chat { username: String, text: String },
    /// A participant joined.
    UserJoined { username: String },
    /// A participant left.
    UserLeft { username: String },
    /// Full roster snapshot in join order. Replaces any previous roster.
    Roster { users: Vec<String> },
    /// A rejection the server addressed to this connection only
    /// (invalid input or a display name already in use).
    ServerError { text: String },
}

impl From<ServerEvent> for ChatEvent {
    fn from(event: ServerEvent) -> Self {
        match event {
            ServerEvent::Message(MessagePayload::Chat { username, text }) => {
                Self::Chat { username, text }
            }
            ServerEvent::Message(MessagePayload::Join { username }) => Self::UserJoined { username },
            ServerEvent::Message(MessagePayload::Leave { username }) => Self::UserLeft { username },
            ServerEvent::Message(MessagePayload::Error { text }) => Self::ServerError { text },
            ServerEvent::UserList { users } => Self::Roster { users },
        }
    }
}

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
    fn chat_payload_maps_to_chat_event() {
        let event = ChatEvent::from(ServerEvent::Message(MessagePayload::Chat {
            username: "alice".into(),
            text: "hi".into(),
        }));
        assert_eq!(
            event,
            ChatEvent::Chat {
                username: "alice".into(),
                text: "hi".into()
            }
        );
    }

    #[test]
    fn user_list_maps_to_roster() {
        let event = ChatEvent::from(ServerEvent::UserList {
            users: vec!["alice".into(), "bob".into()],
        });
        assert_eq!(
            event,
            ChatEvent::Roster {
                users: vec!["alice".into(), "bob".into()]
            }
        );
    }

    #[test]
    fn error_payload_maps_to_server_error() {
        let event = ChatEvent::from(ServerEvent::Message(MessagePayload::Error {
            text: "name already in use, choose another".into(),
        }));
        assert!(matches!(event, ChatEvent::ServerError { .. }));
    }
}
