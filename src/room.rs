//! The broadcast engine: a single actor task that owns the session registry
//! and fans events out to every connected client.
//!
//! Connection handler tasks never touch shared state directly — they send
//! [`RoomCommand`]s over one mpsc channel and the room processes them in
//! arrival order. Serializing all registry access through this queue is what
//! makes the name-uniqueness check atomic: two simultaneous joins for the
//! same name are handled one after the other, so exactly one succeeds.
//!
//! Fan-out is best-effort. A connection whose outbound channel is gone is
//! skipped and logged; it never blocks or aborts delivery to the others.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::{
    trimmed_message, trimmed_username, ClientEvent, MessagePayload, ServerEvent,
};
use crate::registry::{ConnectionId, RegisterError, Registry};

/// Rejection sent when a join carries an empty or oversized name.
const ERR_INVALID_NAME: &str = "name must be non-empty and ≤ 50 chars";
/// Rejection sent when a join asks for a name another session holds.
const ERR_NAME_TAKEN: &str = "name already in use, choose another";
/// Rejection sent when a joined connection tries to join again.
const ERR_ALREADY_JOINED: &str = "already joined";
/// Rejection sent when a message is empty or oversized.
const ERR_INVALID_MESSAGE: &str = "message must be non-empty and ≤ 1000 chars";

/// Commands delivered to the room by connection handler tasks.
#[derive(Debug)]
pub enum RoomCommand {
    /// A transport connection was accepted. No session exists yet.
    Connect {
        id: ConnectionId,
        /// Outbound channel the room uses to reach this connection.
        sender: mpsc::UnboundedSender<ServerEvent>,
    },
    /// The connection sent a protocol event.
    Inbound { id: ConnectionId, event: ClientEvent },
    /// The connection closed, explicitly or transport-detected.
    Disconnect { id: ConnectionId },
}

/// The chat room actor. Create with [`Room::new`], then drive it with
/// [`Room::run`] on its own task.
#[derive(Debug)]
pub struct Room {
    registry: Registry,
    peers: HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
    commands: mpsc::UnboundedReceiver<RoomCommand>,
}

impl Room {
    /// Create a room fed by `commands`.
    pub fn new(commands: mpsc::UnboundedReceiver<RoomCommand>) -> Self {
        Self {
            registry: Registry::new(),
            peers: HashMap::new(),
            commands,
        }
    }

    /// Process commands until every sender is dropped.
    pub async fn run(mut self) {
        debug!("room started");
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        debug!("room stopped");
    }

    /// Dispatch one command. Split out from [`run`](Self::run) so the engine
    /// can be driven directly in tests, without any live transport.
    fn handle(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Connect { id, sender } => {
                debug!(connection = %id, "client connected");
                self.peers.insert(id, sender);
            }
            RoomCommand::Inbound { id, event } => match event {
                ClientEvent::Join { username } => self.on_join(id, &username),
                ClientEvent::SendMessage { text } => self.on_send_message(id, &text),
            },
            RoomCommand::Disconnect { id } => self.on_disconnect(id),
        }
    }

    fn on_join(&mut self, id: ConnectionId, username: &str) {
        let Some(name) = trimmed_username(username) else {
            self.reply_error(id, ERR_INVALID_NAME);
            return;
        };

        match self.registry.register(id, name) {
            Ok(()) => {
                info!(connection = %id, username = %name, "user joined");
                self.broadcast(ServerEvent::Message(MessagePayload::Join {
                    username: name.to_owned(),
                }));
                self.broadcast_roster();
            }
            Err(RegisterError::NameTaken) => {
                debug!(connection = %id, username = %name, "join refused, name taken");
                self.reply_error(id, ERR_NAME_TAKEN);
            }
            Err(RegisterError::AlreadyRegistered) => {
                debug!(connection = %id, "join refused, already joined");
                self.reply_error(id, ERR_ALREADY_JOINED);
            }
        }
    }

    fn on_send_message(&mut self, id: ConnectionId, text: &str) {
        // No session means no sender identity; drop without a reply so a
        // pre-join race does not leak state to the connection.
        let Some(username) = self.registry.name_of(id).map(str::to_owned) else {
            debug!(connection = %id, "dropping message from nameless connection");
            return;
        };

        let Some(text) = trimmed_message(text) else {
            self.reply_error(id, ERR_INVALID_MESSAGE);
            return;
        };

        self.broadcast(ServerEvent::Message(MessagePayload::Chat {
            username,
            text: text.to_owned(),
        }));
    }

    fn on_disconnect(&mut self, id: ConnectionId) {
        self.peers.remove(&id);
        if let Some(username) = self.registry.unregister(id) {
            info!(connection = %id, username = %username, "user disconnected");
            self.broadcast(ServerEvent::Message(MessagePayload::Leave { username }));
            self.broadcast_roster();
        } else {
            debug!(connection = %id, "connection closed before joining");
        }
    }

    /// Send `event` to every connected client, the originator included.
    fn broadcast(&self, event: ServerEvent) {
        for (id, sender) in &self.peers {
            if sender.send(event.clone()).is_err() {
                // Channel gone: the connection is mid-teardown and its
                // Disconnect command is already queued behind this one.
                warn!(connection = %id, "skipping broadcast to closed connection");
            }
        }
    }

    /// Send the full roster snapshot to every connected client.
    fn broadcast_roster(&self) {
        self.broadcast(ServerEvent::UserList {
            users: self.registry.names(),
        });
    }

    /// Send an error payload to one connection only.
    fn reply_error(&self, id: ConnectionId, text: &str) {
        if let Some(sender) = self.peers.get(&id) {
            let event = ServerEvent::Message(MessagePayload::Error {
                text: text.to_owned(),
            });
            if sender.send(event).is_err() {
                warn!(connection = %id, "failed to deliver error reply");
            }
        }
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
    use uuid::Uuid;

    /// A room plus directly-driven connections: no transport, no tasks.
    struct Harness {
        room: Room,
        peers: Vec<(ConnectionId, mpsc::UnboundedReceiver<ServerEvent>)>,
    }

    impl Harness {
        fn new() -> Self {
            // The command sender half is unused: tests call `handle` directly.
            let (_tx, rx) = mpsc::unbounded_channel();
            Self {
                room: Room::new(rx),
                peers: Vec::new(),
            }
        }

        fn connect(&mut self) -> ConnectionId {
            let id = Uuid::new_v4();
            let (tx, rx) = mpsc::unbounded_channel();
            self.room.handle(RoomCommand::Connect { id, sender: tx });
            self.peers.push((id, rx));
            id
        }

        fn join(&mut self, id: ConnectionId, username: &str) {
            self.room.handle(RoomCommand::Inbound {
                id,
                event: ClientEvent::Join {
                    username: username.to_owned(),
                },
            });
        }

        fn send(&mut self, id: ConnectionId, text: &str) {
            self.room.handle(RoomCommand::Inbound {
                id,
                event: ClientEvent::SendMessage {
                    text: text.to_owned(),
                },
            });
        }

        fn disconnect(&mut self, id: ConnectionId) {
            self.room.handle(RoomCommand::Disconnect { id });
        }

        /// Drain everything queued for `id`.
        fn events_of(&mut self, id: ConnectionId) -> Vec<ServerEvent> {
            let (_, rx) = self
                .peers
                .iter_mut()
                .find(|(peer, _)| *peer == id)
                .expect("unknown connection");
            let mut events = Vec::new();
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
            events
        }
    }

    fn is_error(event: &ServerEvent) -> bool {
        matches!(event, ServerEvent::Message(MessagePayload::Error { .. }))
    }

    #[test]
    fn join_broadcasts_presence_then_roster() {
        let mut h = Harness::new();
        let a = h.connect();
        h.join(a, "alice");

        let events = h.events_of(a);
        assert_eq!(
            events,
            vec![
                ServerEvent::Message(MessagePayload::Join {
                    username: "alice".into()
                }),
                ServerEvent::UserList {
                    users: vec!["alice".into()]
                },
            ]
        );
    }

    #[test]
    fn join_name_is_trimmed_before_registration() {
        let mut h = Harness::new();
        let a = h.connect();
        h.join(a, "  alice  ");

        assert_eq!(
            h.events_of(a).first(),
            Some(&ServerEvent::Message(MessagePayload::Join {
                username: "alice".into()
            }))
        );
    }

    #[test]
    fn blank_or_oversized_name_is_rejected_to_caller_only() {
        let mut h = Harness::new();
        let a = h.connect();
        let b = h.connect();

        h.join(a, "   ");
        h.join(a, &"x".repeat(51));

        let events = h.events_of(a);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(is_error));
        // No broadcast reached the other connection, and no roster changed.
        assert!(h.events_of(b).is_empty());
    }

    #[test]
    fn duplicate_join_yields_exactly_one_session() {
        let mut h = Harness::new();
        let a = h.connect();
        let b = h.connect();

        h.join(a, "x");
        h.join(b, "x");

        // The first joiner saw the join broadcast and the roster.
        let a_events = h.events_of(a);
        assert_eq!(a_events.len(), 2);
        // The loser got a single error reply on top of the winner's broadcast.
        let b_events = h.events_of(b);
        assert!(b_events.iter().any(is_error));

        // Roster holds exactly one "x".
        assert_eq!(h.room.registry.names(), vec!["x"]);
    }

    #[test]
    fn rejoining_under_a_new_name_is_refused() {
        let mut h = Harness::new();
        let a = h.connect();
        h.join(a, "alice");
        h.events_of(a);

        h.join(a, "alice2");
        let events = h.events_of(a);
        assert_eq!(events.len(), 1);
        assert!(is_error(&events[0]));
        assert_eq!(h.room.registry.names(), vec!["alice"]);
    }

    #[test]
    fn chat_is_broadcast_to_everyone_including_sender() {
        let mut h = Harness::new();
        let a = h.connect();
        let b = h.connect();
        h.join(a, "alice");
        h.join(b, "bob");
        h.events_of(a);
        h.events_of(b);

        h.send(a, "hi");

        let expected = ServerEvent::Message(MessagePayload::Chat {
            username: "alice".into(),
            text: "hi".into(),
        });
        assert_eq!(h.events_of(a), vec![expected.clone()]);
        assert_eq!(h.events_of(b), vec![expected]);
    }

    #[test]
    fn message_from_nameless_connection_is_dropped_silently() {
        let mut h = Harness::new();
        let a = h.connect();
        let b = h.connect();
        h.join(b, "bob");
        h.events_of(a);
        h.events_of(b);

        h.send(a, "sneaky");

        // No broadcast anywhere, and no error back to the sender either.
        assert!(h.events_of(a).is_empty());
        assert!(h.events_of(b).is_empty());
    }

    #[test]
    fn oversized_message_is_rejected_to_sender_only() {
        let mut h = Harness::new();
        let a = h.connect();
        let b = h.connect();
        h.join(a, "alice");
        h.join(b, "bob");
        h.events_of(a);
        h.events_of(b);

        h.send(a, &"x".repeat(1001));
        h.send(a, "   ");

        let a_events = h.events_of(a);
        assert_eq!(a_events.len(), 2);
        assert!(a_events.iter().all(is_error));
        assert!(h.events_of(b).is_empty());
    }

    #[test]
    fn disconnect_broadcasts_leave_and_frees_the_name() {
        let mut h = Harness::new();
        let a = h.connect();
        let b = h.connect();
        h.join(a, "alice");
        h.join(b, "bob");
        h.events_of(b);

        h.disconnect(a);

        assert_eq!(
            h.events_of(b),
            vec![
                ServerEvent::Message(MessagePayload::Leave {
                    username: "alice".into()
                }),
                ServerEvent::UserList {
                    users: vec!["bob".into()]
                },
            ]
        );

        // The freed name is reusable by a fresh connection.
        let c = h.connect();
        h.join(c, "alice");
        assert_eq!(
            h.events_of(c).first(),
            Some(&ServerEvent::Message(MessagePayload::Join {
                username: "alice".into()
            }))
        );
    }

    #[test]
    fn disconnect_before_join_broadcasts_nothing() {
        let mut h = Harness::new();
        let a = h.connect();
        let b = h.connect();
        h.join(b, "bob");
        h.events_of(b);

        h.disconnect(a);
        assert!(h.events_of(b).is_empty());
    }

    #[test]
    fn dead_peer_does_not_abort_fanout_to_others() {
        let mut h = Harness::new();
        let a = h.connect();
        let b = h.connect();
        h.join(a, "alice");
        h.join(b, "bob");
        h.events_of(a);
        h.events_of(b);

        // Simulate a torn-down connection whose Disconnect has not yet been
        // processed: drop b's receiver, then broadcast.
        h.peers.retain(|(peer, _)| *peer != b);
        h.send(a, "still here?");

        assert_eq!(h.events_of(a).len(), 1);
    }
}
