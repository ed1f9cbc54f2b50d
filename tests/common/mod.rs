#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for chat client integration tests.
//!
//! Provides a channel-based loopback transport whose "server side" the test
//! drives directly, plus a connector that hands out a scripted sequence of
//! dial results — enough to walk the reconnect state machine without any
//! real network.

use std::collections::VecDeque;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use chat_relay::protocol::{ClientEvent, MessagePayload, ServerEvent};
use chat_relay::{ChatError, Connector, Transport};

// ── Loopback transport ──────────────────────────────────────────────

/// Client half of an in-process transport pair.
///
/// `recv` yields whatever the matching [`LoopbackServer`] injected; dropping
/// the server half reads as a clean connection close.
pub struct LoopbackTransport {
    incoming: mpsc::UnboundedReceiver<Result<String, ChatError>>,
    outgoing: mpsc::UnboundedSender<String>,
}

/// Server half of an in-process transport pair — the test drives this.
pub struct LoopbackServer {
    /// Messages the client sent, in order.
    pub from_client: mpsc::UnboundedReceiver<String>,
    /// Inject server messages (or transport errors) here.
    pub to_client: mpsc::UnboundedSender<Result<String, ChatError>>,
}

/// Create a connected `(transport, server)` pair.
pub fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();

    let transport = LoopbackTransport {
        incoming: client_rx,
        outgoing: client_tx,
    };
    let server = LoopbackServer {
        from_client: server_rx,
        to_client: server_tx,
    };
    (transport, server)
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), ChatError> {
        self.outgoing
            .send(message)
            .map_err(|e| ChatError::TransportSend(e.to_string()))
    }

    /// Cancel-safe: `mpsc::UnboundedReceiver::recv` is cancel-safe.
    async fn recv(&mut self) -> Option<Result<String, ChatError>> {
        self.incoming.recv().await
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        Ok(())
    }
}

impl LoopbackServer {
    /// Serialize and deliver a server event to the client.
    pub fn send_event(&self, event: &ServerEvent) {
        let json = serde_json::to_string(event).unwrap();
        self.to_client.send(Ok(json)).unwrap();
    }

    /// Inject a transport-level receive error.
    pub fn send_error(&self, message: &str) {
        self.to_client
            .send(Err(ChatError::TransportReceive(message.into())))
            .unwrap();
    }

    /// Await and decode the next event the client sent.
    ///
    /// Panics after two seconds of silence.
    pub async fn recv_client_event(&mut self) -> ClientEvent {
        let raw = tokio::time::timeout(Duration::from_secs(2), self.from_client.recv())
            .await
            .expect("timed out waiting for a client event")
            .expect("client transport dropped");
        serde_json::from_str(&raw).expect("client sent malformed JSON")
    }

    /// Acknowledge a join: broadcast the join notification and a roster.
    pub fn acknowledge_join(&self, username: &str, roster: &[&str]) {
        self.send_event(&ServerEvent::Message(MessagePayload::Join {
            username: username.to_owned(),
        }));
        self.send_event(&ServerEvent::UserList {
            users: roster.iter().map(|s| (*s).to_owned()).collect(),
        });
    }

    /// Refuse a join the way the relay does for a taken name.
    pub fn refuse_join_name_taken(&self) {
        self.send_event(&ServerEvent::Message(MessagePayload::Error {
            text: "name already in use, choose another".into(),
        }));
    }
}

// ── Scripted connector ──────────────────────────────────────────────

/// A [`Connector`] producing a scripted sequence of dial results. Dials
/// beyond the script are refused.
pub struct ScriptedConnector {
    dials: StdMutex<VecDeque<Result<LoopbackTransport, ChatError>>>,
}

impl ScriptedConnector {
    pub fn new(dials: Vec<Result<LoopbackTransport, ChatError>>) -> Self {
        Self {
            dials: StdMutex::new(VecDeque::from(dials)),
        }
    }

    /// The dial error used for refused connections.
    pub fn refused() -> ChatError {
        ChatError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ))
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Transport = LoopbackTransport;

    async fn connect(&self) -> Result<LoopbackTransport, ChatError> {
        self.dials
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::refused()))
    }
}
