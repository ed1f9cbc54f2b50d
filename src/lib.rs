//! # Chat Relay
//!
//! Transport-agnostic group chat: a relay server that tracks which
//! connections are registered under which display names and fans messages
//! out to every participant, plus an async client whose reconnect state
//! machine keeps a session usable across transient network failures.
//!
//! ## Features
//!
//! - **Transport-agnostic client** — implement the [`Transport`] and
//!   [`Connector`] traits for any backend
//! - **WebSocket built-in** — the default `transport-websocket` feature
//!   provides [`WebSocketConnector`] and the [`ChatServer`] front end
//! - **Event-driven** — consume typed [`ChatEvent`]s via a channel; rendering
//!   is entirely up to the embedder
//! - **Single-writer registry** — name uniqueness is enforced by one actor
//!   task, so two racing joins for the same name can never both succeed
//! - **Bounded reconnection** — a fixed retry budget with a fixed delay, and
//!   automatic replay of the chosen display name on reconnect
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "transport-websocket")]
//! # async fn example() -> chat_relay::Result<()> {
//! use chat_relay::{ChatClient, ChatConfig, ChatEvent, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new("ws://localhost:4000");
//! let (client, mut events) = ChatClient::connect(connector, ChatConfig::default()).await?;
//!
//! client.join("alice")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ChatEvent::Chat { username, text } => println!("<{username}> {text}"),
//!         ChatEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;
pub mod error;
pub mod event;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod transport;
pub mod transports;

#[cfg(feature = "transport-websocket")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport-websocket")))]
pub mod server;

// Re-export primary types for ergonomic imports.
pub use client::{ChatClient, ChatConfig, ConnectionState};
pub use error::{ChatError, Result};
pub use event::ChatEvent;
pub use protocol::{ClientEvent, MessagePayload, ServerEvent};
pub use registry::{ConnectionId, Registry};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use server::{ChatServer, ServerConfig};
#[cfg(feature = "transport-websocket")]
pub use transports::websocket::{WebSocketConnector, WebSocketTransport};
