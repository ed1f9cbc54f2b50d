//! Built-in [`Transport`](crate::transport::Transport) implementations.
//!
//! Currently one backend is provided: WebSocket via `tokio-tungstenite`,
//! enabled by the default `transport-websocket` feature. Custom backends
//! implement [`Transport`](crate::transport::Transport) and
//! [`Connector`](crate::transport::Connector) directly.

#[cfg(feature = "transport-websocket")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport-websocket")))]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
