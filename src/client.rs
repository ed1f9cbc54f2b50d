//! Async chat client with automatic reconnection.
//!
//! [`ChatClient`] is a thin handle that communicates with a background
//! supervisor task via an unbounded MPSC channel. Events are emitted on a
//! bounded channel ([`tokio::sync::mpsc::Receiver<ChatEvent>`]) returned
//! from [`ChatClient::connect`].
//!
//! The supervisor owns the [`Connector`] and the live [`Transport`]. When
//! the transport drops mid-session it runs the reconnection state machine:
//! a bounded number of dials spaced by a fixed delay, with the chosen
//! display name replayed automatically on the first dial that succeeds.
//! The initial connection is different on purpose — a failed first dial is
//! returned to the caller and never retried.
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WebSocketConnector::new("ws://localhost:4000");
//! let (client, mut events) = ChatClient::connect(connector, ChatConfig::default()).await?;
//!
//! client.join("alice")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ChatEvent::Chat { username, text } => { /* … */ }
//!         ChatEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::{ChatError, Result};
use crate::event::ChatEvent;
use crate::protocol::{
    trimmed_message, trimmed_username, ClientEvent, MessagePayload, ServerEvent,
};
use crate::transport::{Connector, Transport};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default number of reconnect attempts after a mid-session disconnect.
const DEFAULT_RECONNECT_ATTEMPTS: u32 = 3;

/// Default spacing between reconnect attempts.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`ChatClient`] connection.
///
/// All fields have sensible defaults; tests typically inject
/// `Duration::ZERO` as the reconnect delay to run the retry state machine
/// without waiting.
///
/// # Example
///
/// ```
/// use chat_relay::client::ChatConfig;
/// use std::time::Duration;
///
/// let config = ChatConfig::default()
///     .with_reconnect_attempts(5)
///     .with_reconnect_delay(Duration::from_secs(1));
/// assert_eq!(config.reconnect_attempts, 5);
/// ```
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Number of reconnect attempts after a mid-session disconnect.
    /// Defaults to **3**. The initial connection is never retried.
    pub reconnect_attempts: u32,
    /// Fixed spacing between failed reconnect attempts. Defaults to **2 s**.
    pub reconnect_delay: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up with incoming server events, events
    /// are dropped (with a warning logged) to avoid blocking the supervisor.
    /// Lifecycle events (connection lost, reconnect progress, disconnected)
    /// are always delivered regardless of capacity.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`ChatClient::shutdown`] is called, the supervisor is given this
    /// much time to close the transport and emit a final
    /// [`ChatEvent::Disconnected`]. If the timeout expires the task is
    /// aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ChatConfig {
    /// Set the number of reconnect attempts.
    #[must_use]
    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    /// Set the spacing between reconnect attempts.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Connection state ────────────────────────────────────────────────

/// Where the client currently is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No connection and no reconnect in progress. Terminal until
    /// [`ChatClient::join`] is called again.
    Disconnected = 0,
    /// A dial is in flight (initial connection or manual retry).
    Connecting = 1,
    /// The transport is up and the session is usable.
    Connected = 2,
    /// The transport dropped mid-session; the retry budget is being spent.
    Reconnecting = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            _ => Self::Disconnected,
        }
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// Internal shared state between the client handle and the supervisor.
struct ClientShared {
    state: AtomicU8,
    /// Whether the server has acknowledged our join (a session exists).
    joined: AtomicBool,
    /// The chosen display name. Set once on the first join and kept across
    /// reconnects so the supervisor can replay it.
    username: Mutex<Option<String>>,
}

impl ClientShared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            joined: AtomicBool::new(false),
            username: Mutex::new(None),
        }
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Commands queued from the handle to the supervisor.
#[derive(Debug)]
enum Command {
    Join(String),
    Send(String),
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running chat session.
///
/// Created via [`ChatClient::connect`], which dials the relay, spawns the
/// background supervisor, and returns this handle together with an event
/// receiver. The public methods queue work for the supervisor and return
/// immediately (no round-trip await).
pub struct ChatClient {
    /// Sender half of the command channel to the supervisor.
    cmd_tx: mpsc::UnboundedSender<Command>,
    /// Shared state updated by the supervisor.
    shared: Arc<ClientShared>,
    /// Handle to the background supervisor task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the supervisor to shut down gracefully.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Timeout for the graceful shutdown.
    shutdown_timeout: Duration,
}

impl ChatClient {
    /// Dial the relay once and start the client.
    ///
    /// A failed initial dial is returned to the caller and is **not**
    /// retried — automatic reconnection only covers connections lost
    /// mid-session.
    ///
    /// # Returns
    ///
    /// A tuple of `(client_handle, event_receiver)`. The receiver yields
    /// [`ChatEvent`]s, starting with [`ChatEvent::Connected`], until the
    /// client shuts down.
    ///
    /// # Errors
    ///
    /// Whatever the connector's dial produced, typically [`ChatError::Io`]
    /// or [`ChatError::Timeout`].
    pub async fn connect<C: Connector>(
        connector: C,
        config: ChatConfig,
    ) -> Result<(Self, mpsc::Receiver<ChatEvent>)> {
        let shared = Arc::new(ClientShared::new());

        let transport = match connector.connect().await {
            Ok(transport) => transport,
            Err(e) => {
                shared.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        shared.set_state(ConnectionState::Connected);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<ChatEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let supervisor = Supervisor {
            connector,
            cmd_rx,
            event_tx,
            shared: Arc::clone(&shared),
            max_attempts: config.reconnect_attempts,
            delay: config.reconnect_delay,
            join_pending: false,
        };
        let task = tokio::spawn(supervisor.run(transport, shutdown_rx));

        let client = Self {
            cmd_tx,
            shared,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        Ok((client, event_rx))
    }

    // ── Public API methods ──────────────────────────────────────────

    /// Announce a display name (or retry the connection with the name after
    /// the retry budget was spent).
    ///
    /// The name is trimmed and validated locally before anything is sent;
    /// the server revalidates and may still refuse it as taken, which
    /// arrives as a [`ChatEvent::ServerError`].
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidName`] for an empty or oversized name,
    /// or [`ChatError::NotConnected`] when the client has shut down.
    pub fn join(&self, username: &str) -> Result<()> {
        let name = trimmed_username(username).ok_or(ChatError::InvalidName)?;
        self.cmd_tx
            .send(Command::Join(name.to_owned()))
            .map_err(|_| ChatError::NotConnected)
    }

    /// Send a chat message.
    ///
    /// While the client is not [`Connected`](ConnectionState::Connected) the
    /// transport is never touched: the call fails with
    /// [`ChatError::NotConnected`] and the message is dropped (resend after
    /// the connection is restored). The reconnection machinery keeps running
    /// in the background either way.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidMessage`] for empty or oversized text,
    /// or [`ChatError::NotConnected`] as described above.
    pub fn send_message(&self, text: &str) -> Result<()> {
        let text = trimmed_message(text).ok_or(ChatError::InvalidMessage)?;
        if self.shared.state() != ConnectionState::Connected {
            return Err(ChatError::NotConnected);
        }
        self.cmd_tx
            .send(Command::Send(text.to_owned()))
            .map_err(|_| ChatError::NotConnected)
    }

    /// Shut down the client, closing the transport and stopping the
    /// supervisor.
    ///
    /// After calling this method the event receiver will yield a final
    /// [`ChatEvent::Disconnected`] and then `None`.
    pub async fn shutdown(&mut self) {
        debug!("ChatClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the supervisor with a timeout. If it doesn't exit in time,
        // abort it so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("supervisor terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("supervisor did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("supervisor aborted: {join_err}");
                    }
                }
            }
        }

        self.shared.set_state(ConnectionState::Disconnected);
        self.shared.joined.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Current position in the connection lifecycle.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// `true` while the transport is believed to be connected.
    pub fn is_connected(&self) -> bool {
        self.shared.state() == ConnectionState::Connected
    }

    /// `true` while the server has acknowledged our display name. Cleared
    /// on every connection loss and only set again once a (re)join is
    /// acknowledged — after a reconnect whose name replay was refused, this
    /// stays `false`.
    pub fn is_joined(&self) -> bool {
        self.shared.joined.load(Ordering::Acquire)
    }

    /// The chosen display name, if one was set via [`join`](Self::join).
    pub async fn username(&self) -> Option<String> {
        self.shared.username.lock().await.clone()
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("state", &self.state())
            .field("joined", &self.is_joined())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        // `Drop` is synchronous so we cannot await a graceful shutdown.
        // The only safe action is to abort the spawned task, which causes
        // the supervisor future to be dropped immediately. The oneshot is
        // intentionally *not* sent here: the graceful path awaits
        // `transport.close()`, and there is no executor context to drive
        // it inside `Drop`.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Supervisor ──────────────────────────────────────────────────────

/// How one transport session ended.
enum SessionEnd {
    /// Graceful shutdown was requested.
    Shutdown,
    /// The handle was dropped; nobody is left to issue commands.
    HandleClosed,
    /// The transport failed or the server closed the connection.
    Lost(Option<String>),
}

/// How a reconnection round ended.
enum ReconnectOutcome<T> {
    Restored(T),
    GaveUp,
    Shutdown,
}

/// Background task owning the connector, the live transport, and the
/// reconnection state machine.
struct Supervisor<C: Connector> {
    connector: C,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::Sender<ChatEvent>,
    shared: Arc<ClientShared>,
    max_attempts: u32,
    delay: Duration,
    /// A join was sent and no acknowledgment (join broadcast with our name)
    /// or rejection has been observed yet.
    join_pending: bool,
}

impl<C: Connector> Supervisor<C> {
    async fn run(mut self, transport: C::Transport, mut shutdown_rx: oneshot::Receiver<()>) {
        debug!("supervisor started");
        emit_event(&self.event_tx, ChatEvent::Connected).await;

        let mut transport = Some(transport);
        loop {
            match transport.take() {
                Some(t) => match self.run_session(t, &mut shutdown_rx).await {
                    SessionEnd::Shutdown => {
                        self.finish(Some("client shut down".into())).await;
                        return;
                    }
                    SessionEnd::HandleClosed => {
                        self.finish(Some("client dropped".into())).await;
                        return;
                    }
                    SessionEnd::Lost(reason) => {
                        self.shared.joined.store(false, Ordering::Release);
                        self.shared.set_state(ConnectionState::Reconnecting);
                        warn!(reason = ?reason, "connection lost, reconnecting");
                        emit_lifecycle(&self.event_tx, ChatEvent::ConnectionLost { reason }).await;

                        match self.reconnect(&mut shutdown_rx).await {
                            ReconnectOutcome::Restored(t) => transport = Some(t),
                            ReconnectOutcome::Shutdown => {
                                self.finish(Some("client shut down".into())).await;
                                return;
                            }
                            ReconnectOutcome::GaveUp => {
                                self.shared.set_state(ConnectionState::Disconnected);
                                emit_lifecycle(
                                    &self.event_tx,
                                    ChatEvent::ReconnectFailed {
                                        attempts: self.max_attempts,
                                    },
                                )
                                .await;
                            }
                        }
                    }
                },
                // Disconnected and out of budget: wait for a manual retry.
                None => {
                    tokio::select! {
                        _ = &mut shutdown_rx => {
                            self.finish(Some("client shut down".into())).await;
                            return;
                        }
                        cmd = self.cmd_rx.recv() => match cmd {
                            None => {
                                self.finish(Some("client dropped".into())).await;
                                return;
                            }
                            Some(Command::Join(name)) => {
                                transport = self.manual_retry(name).await;
                            }
                            Some(Command::Send(_)) => {
                                // The handle rejects sends while not
                                // connected; anything that slips through a
                                // state race is dropped here.
                                debug!("dropping message queued while disconnected");
                            }
                        }
                    }
                }
            }
        }
    }

    /// Drive one live transport until it ends.
    async fn run_session(
        &mut self,
        mut transport: C::Transport,
        shutdown_rx: &mut oneshot::Receiver<()>,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                // Branch 1: outgoing command from the client handle
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(command) => {
                            if let Err(reason) = self.forward(&mut transport, command).await {
                                return SessionEnd::Lost(Some(reason));
                            }
                        }
                        None => {
                            debug!("command channel closed, ending session");
                            let _ = transport.close().await;
                            return SessionEnd::HandleClosed;
                        }
                    }
                }

                // Branch 2: shutdown signal
                _ = &mut *shutdown_rx => {
                    debug!("shutdown signal received");
                    let _ = transport.close().await;
                    return SessionEnd::Shutdown;
                }

                // Branch 3: incoming event from the server
                incoming = transport.recv() => {
                    match incoming {
                        Some(Ok(text)) => {
                            match serde_json::from_str::<ServerEvent>(&text) {
                                Ok(event) => {
                                    self.observe(&event).await;
                                    emit_event(&self.event_tx, ChatEvent::from(event)).await;
                                }
                                Err(e) => {
                                    warn!("failed to deserialize server event: {e} — raw: {text}");
                                }
                            }
                        }
                        Some(Err(e)) => {
                            error!("transport receive error: {e}");
                            return SessionEnd::Lost(Some(format!("transport receive error: {e}")));
                        }
                        None => {
                            debug!("connection closed by server");
                            return SessionEnd::Lost(None);
                        }
                    }
                }
            }
        }
    }

    /// Serialize and transmit one queued command.
    ///
    /// # Errors
    ///
    /// Returns the loss reason when the transport write fails.
    async fn forward(
        &mut self,
        transport: &mut C::Transport,
        command: Command,
    ) -> std::result::Result<(), String> {
        let event = match command {
            Command::Join(name) => {
                *self.shared.username.lock().await = Some(name.clone());
                self.join_pending = true;
                ClientEvent::Join { username: name }
            }
            Command::Send(text) => ClientEvent::SendMessage { text },
        };

        match serde_json::to_string(&event) {
            Ok(json) => transport.send(json).await.map_err(|e| {
                error!("transport send error: {e}");
                format!("transport send error: {e}")
            }),
            Err(e) => {
                // Serialization errors are programming bugs; don't kill the loop.
                error!("failed to serialize client event: {e}");
                Ok(())
            }
        }
    }

    /// Track session acknowledgment from the inbound stream.
    ///
    /// A join broadcast carrying our exact name acknowledges the pending
    /// join (names are unique, so it can only be ours). An error reply while
    /// a join is pending is its rejection — after a reconnect replay this is
    /// how a name stolen during the outage surfaces, and the joined flag
    /// stays down.
    async fn observe(&mut self, event: &ServerEvent) {
        if !self.join_pending {
            return;
        }
        match event {
            ServerEvent::Message(MessagePayload::Join { username }) => {
                let ours = self.shared.username.lock().await;
                if ours.as_deref() == Some(username.as_str()) {
                    self.join_pending = false;
                    self.shared.joined.store(true, Ordering::Release);
                    debug!(username = %username, "join acknowledged");
                }
            }
            ServerEvent::Message(MessagePayload::Error { text }) => {
                // The joined flag is left as-is: it is already false when
                // this was a post-reconnect replay, and an acknowledged
                // session survives a refused second join.
                self.join_pending = false;
                warn!(error = %text, "join refused");
            }
            _ => {}
        }
    }

    /// Spend the retry budget: up to `max_attempts` dials, spaced by the
    /// fixed delay, one at a time. On the first success the chosen name is
    /// replayed before the session is declared usable again.
    async fn reconnect(
        &mut self,
        shutdown_rx: &mut oneshot::Receiver<()>,
    ) -> ReconnectOutcome<C::Transport> {
        for attempt in 1..=self.max_attempts {
            emit_lifecycle(
                &self.event_tx,
                ChatEvent::Reconnecting {
                    attempt,
                    max_attempts: self.max_attempts,
                },
            )
            .await;

            match self.connector.connect().await {
                Ok(mut transport) => {
                    if let Err(e) = self.replay_identity(&mut transport).await {
                        warn!(attempt, error = %e, "reconnected transport failed during name replay");
                    } else {
                        self.shared.set_state(ConnectionState::Connected);
                        info!(attempt, "reconnected");
                        emit_lifecycle(&self.event_tx, ChatEvent::Reconnected).await;
                        return ReconnectOutcome::Restored(transport);
                    }
                }
                Err(e) => {
                    warn!(attempt, max_attempts = self.max_attempts, error = %e, "reconnect attempt failed");
                }
            }

            if attempt < self.max_attempts {
                tokio::select! {
                    _ = &mut *shutdown_rx => return ReconnectOutcome::Shutdown,
                    () = tokio::time::sleep(self.delay) => {}
                }
            }
        }
        warn!(attempts = self.max_attempts, "reconnect budget exhausted");
        ReconnectOutcome::GaveUp
    }

    /// Re-issue `join` with the previously chosen name, if any.
    ///
    /// The server may still refuse the replay (the name can have been
    /// claimed during the outage); that refusal arrives in-band and is
    /// handled by [`observe`](Self::observe).
    async fn replay_identity(&mut self, transport: &mut C::Transport) -> Result<()> {
        let name = self.shared.username.lock().await.clone();
        let Some(username) = name else {
            return Ok(());
        };
        debug!(username = %username, "replaying display name");
        self.join_pending = true;
        let json = serde_json::to_string(&ClientEvent::Join { username })?;
        transport.send(json).await
    }

    /// One fresh dial triggered by a `join` call after the budget was spent.
    async fn manual_retry(&mut self, name: String) -> Option<C::Transport> {
        self.shared.set_state(ConnectionState::Connecting);
        *self.shared.username.lock().await = Some(name.clone());

        match self.connector.connect().await {
            Ok(mut transport) => {
                self.join_pending = true;
                let send_result = match serde_json::to_string(&ClientEvent::Join { username: name })
                {
                    Ok(json) => transport.send(json).await,
                    Err(e) => {
                        error!("failed to serialize client event: {e}");
                        Ok(())
                    }
                };
                match send_result {
                    Ok(()) => {
                        self.shared.set_state(ConnectionState::Connected);
                        emit_lifecycle(&self.event_tx, ChatEvent::Connected).await;
                        Some(transport)
                    }
                    Err(e) => {
                        self.shared.set_state(ConnectionState::Disconnected);
                        emit_lifecycle(
                            &self.event_tx,
                            ChatEvent::Disconnected {
                                reason: Some(format!("transport send error: {e}")),
                            },
                        )
                        .await;
                        None
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "manual retry failed");
                self.shared.set_state(ConnectionState::Disconnected);
                emit_lifecycle(
                    &self.event_tx,
                    ChatEvent::Disconnected {
                        reason: Some(format!("connect failed: {e}")),
                    },
                )
                .await;
                None
            }
        }
    }

    /// Mark the client disconnected and emit the final event.
    async fn finish(&mut self, reason: Option<String>) {
        self.shared.set_state(ConnectionState::Disconnected);
        self.shared.joined.store(false, Ordering::Release);
        emit_lifecycle(&self.event_tx, ChatEvent::Disconnected { reason }).await;
        debug!("supervisor exited");
    }
}

// ── Event emission ──────────────────────────────────────────────────

/// Emit a server-mapped event. If the channel is full, log a warning and
/// drop the event to avoid blocking the supervisor.
async fn emit_event(event_tx: &mpsc::Sender<ChatEvent>, event: ChatEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit a lifecycle event with a blocking send — connection-loss and
/// reconnect-progress events must never be silently dropped.
async fn emit_lifecycle(event_tx: &mpsc::Sender<ChatEvent>, event: ChatEvent) {
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
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
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// A mock transport that records sent messages and replays scripted
    /// responses.
    struct MockTransport {
        /// Messages that `recv()` will yield in order. An explicit `None`
        /// entry signals a clean transport close.
        incoming: VecDeque<Option<std::result::Result<String, ChatError>>>,
        /// Recorded outgoing messages.
        sent: Arc<StdMutex<Vec<String>>>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<String, ChatError>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
            };
            (transport, sent)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), ChatError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, ChatError>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                // All scripted messages delivered — hang forever so the
                // session stays alive until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), ChatError> {
            Ok(())
        }
    }

    /// A connector serving a scripted sequence of dial results and counting
    /// the dials it saw.
    struct ScriptedConnector {
        dials: StdMutex<VecDeque<std::result::Result<MockTransport, ChatError>>>,
        attempts: Arc<AtomicU32>,
    }

    impl ScriptedConnector {
        fn new(
            dials: Vec<std::result::Result<MockTransport, ChatError>>,
        ) -> (Self, Arc<AtomicU32>) {
            let attempts = Arc::new(AtomicU32::new(0));
            (
                Self {
                    dials: StdMutex::new(VecDeque::from(dials)),
                    attempts: Arc::clone(&attempts),
                },
                attempts,
            )
        }

        fn refused() -> ChatError {
            ChatError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Transport = MockTransport;

        async fn connect(&self) -> std::result::Result<MockTransport, ChatError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.dials
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Self::refused()))
        }
    }

    fn zero_delay_config() -> ChatConfig {
        ChatConfig::default().with_reconnect_delay(Duration::ZERO)
    }

    // ── Config tests ────────────────────────────────────────────────

    #[test]
    fn config_defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.reconnect_attempts, 3);
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn config_builder_methods() {
        let config = ChatConfig::default()
            .with_reconnect_attempts(7)
            .with_reconnect_delay(Duration::from_millis(10))
            .with_event_channel_capacity(512)
            .with_shutdown_timeout(Duration::from_secs(5));
        assert_eq!(config.reconnect_attempts, 7);
        assert_eq!(config.reconnect_delay, Duration::from_millis(10));
        assert_eq!(config.event_channel_capacity, 512);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = ChatConfig::default().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    // ── Lifecycle tests ─────────────────────────────────────────────

    #[tokio::test]
    async fn failed_initial_dial_is_returned_and_not_retried() {
        let (connector, attempts) = ScriptedConnector::new(vec![Err(ScriptedConnector::refused())]);

        let result = ChatClient::connect(connector, zero_delay_config()).await;
        assert!(matches!(result, Err(ChatError::Io(_))));
        // Exactly one dial: the initial connection is never retried.
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connected_is_first_event() {
        let (transport, _sent) = MockTransport::new(vec![]);
        let (connector, _) = ScriptedConnector::new(vec![Ok(transport)]);

        let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
            .await
            .unwrap();

        let first = events.recv().await.unwrap();
        assert!(matches!(first, ChatEvent::Connected));
        assert!(client.is_connected());
        assert_eq!(client.state(), ConnectionState::Connected);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn join_sends_join_event_and_stores_username() {
        let (transport, sent) = MockTransport::new(vec![]);
        let (connector, _) = ScriptedConnector::new(vec![Ok(transport)]);

        let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
            .await
            .unwrap();
        let _ = events.recv().await; // Connected

        client.join("  alice  ").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let first: ClientEvent = serde_json::from_str(messages.first().unwrap()).unwrap();
            // The handle trims before sending.
            assert_eq!(
                first,
                ClientEvent::Join {
                    username: "alice".into()
                }
            );
        }
        assert_eq!(client.username().await.as_deref(), Some("alice"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn send_message_sends_send_message_event() {
        let (transport, sent) = MockTransport::new(vec![]);
        let (connector, _) = ScriptedConnector::new(vec![Ok(transport)]);

        let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
            .await
            .unwrap();
        let _ = events.recv().await; // Connected

        client.send_message("hi there").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let last: ClientEvent = serde_json::from_str(messages.last().unwrap()).unwrap();
            assert_eq!(last, ClientEvent::SendMessage { text: "hi there".into() });
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_name_and_message_are_rejected_locally() {
        let (transport, sent) = MockTransport::new(vec![]);
        let (connector, _) = ScriptedConnector::new(vec![Ok(transport)]);

        let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
            .await
            .unwrap();
        let _ = events.recv().await; // Connected

        assert!(matches!(client.join("   "), Err(ChatError::InvalidName)));
        assert!(matches!(
            client.join(&"x".repeat(51)),
            Err(ChatError::InvalidName)
        ));
        assert!(matches!(
            client.send_message(""),
            Err(ChatError::InvalidMessage)
        ));
        assert!(matches!(
            client.send_message(&"x".repeat(1001)),
            Err(ChatError::InvalidMessage)
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        // Nothing reached the transport.
        assert!(sent.lock().unwrap().is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn clean_server_close_triggers_reconnect_budget() {
        // The only transport closes immediately; every redial is refused.
        let (transport, _sent) = MockTransport::new(vec![None]);
        let (connector, attempts) = ScriptedConnector::new(vec![Ok(transport)]);

        let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
            .await
            .unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            ChatEvent::Connected
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            ChatEvent::ConnectionLost { reason: None }
        ));
        for attempt in 1..=3 {
            let event = events.recv().await.unwrap();
            assert_eq!(
                event,
                ChatEvent::Reconnecting {
                    attempt,
                    max_attempts: 3
                }
            );
        }
        assert!(matches!(
            events.recv().await.unwrap(),
            ChatEvent::ReconnectFailed { attempts: 3 }
        ));

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.is_joined());
        // 1 initial dial + 3 reconnect attempts.
        assert_eq!(attempts.load(Ordering::SeqCst), 4);

        // Sends while disconnected never touch the transport.
        assert!(matches!(
            client.send_message("lost"),
            Err(ChatError::NotConnected)
        ));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn transport_error_surfaces_reason_in_connection_lost() {
        let (transport, _sent) =
            MockTransport::new(vec![Some(Err(ChatError::TransportReceive("boom".into())))]);
        let (connector, _) = ScriptedConnector::new(vec![Ok(transport)]);

        let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
            .await
            .unwrap();

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        if let ChatEvent::ConnectionLost { reason } = event {
            assert!(reason.unwrap().contains("boom"));
        } else {
            panic!("expected ConnectionLost, got {event:?}");
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn reconnect_replays_chosen_name() {
        let (first, _first_sent) = MockTransport::new(vec![None]);
        let (second, second_sent) = MockTransport::new(vec![]);
        let (connector, _) = ScriptedConnector::new(vec![Ok(first), Ok(second)]);

        let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
            .await
            .unwrap();
        let _ = events.recv().await; // Connected

        // Choose a name; the first transport is already closing, so the
        // write may or may not land there — the replay must land on the
        // second transport regardless.
        client.join("carol").unwrap();

        // Drain until Reconnected.
        loop {
            match events.recv().await.unwrap() {
                ChatEvent::Reconnected => break,
                ChatEvent::ReconnectFailed { .. } => panic!("reconnect should have succeeded"),
                _ => {}
            }
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let messages = second_sent.lock().unwrap();
            let replayed: ClientEvent = serde_json::from_str(messages.first().unwrap()).unwrap();
            assert_eq!(
                replayed,
                ClientEvent::Join {
                    username: "carol".into()
                }
            );
        }
        assert_eq!(client.state(), ConnectionState::Connected);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn reconnect_without_chosen_name_replays_nothing() {
        let (first, _first_sent) = MockTransport::new(vec![None]);
        let (second, second_sent) = MockTransport::new(vec![]);
        let (connector, _) = ScriptedConnector::new(vec![Ok(first), Ok(second)]);

        let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
            .await
            .unwrap();

        loop {
            if matches!(events.recv().await.unwrap(), ChatEvent::Reconnected) {
                break;
            }
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(second_sent.lock().unwrap().is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn manual_join_after_exhaustion_dials_again() {
        let (first, _first_sent) = MockTransport::new(vec![None]);
        let (fresh, fresh_sent) = MockTransport::new(vec![]);
        // Initial dial, three refused reconnects, then a successful manual retry.
        let (connector, attempts) = ScriptedConnector::new(vec![
            Ok(first),
            Err(ScriptedConnector::refused()),
            Err(ScriptedConnector::refused()),
            Err(ScriptedConnector::refused()),
            Ok(fresh),
        ]);

        let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
            .await
            .unwrap();

        loop {
            if matches!(
                events.recv().await.unwrap(),
                ChatEvent::ReconnectFailed { .. }
            ) {
                break;
            }
        }
        assert_eq!(client.state(), ConnectionState::Disconnected);

        client.join("dave").unwrap();
        // The fresh session announces itself with Connected.
        loop {
            if matches!(events.recv().await.unwrap(), ChatEvent::Connected) {
                break;
            }
        }
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(attempts.load(Ordering::SeqCst), 5);

        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let messages = fresh_sent.lock().unwrap();
            let first_msg: ClientEvent = serde_json::from_str(messages.first().unwrap()).unwrap();
            assert_eq!(
                first_msg,
                ClientEvent::Join {
                    username: "dave".into()
                }
            );
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_emits_disconnected() {
        let (transport, _sent) = MockTransport::new(vec![]);
        let (connector, _) = ScriptedConnector::new(vec![Ok(transport)]);

        let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
            .await
            .unwrap();
        let _ = events.recv().await; // Connected

        client.shutdown().await;

        let event = events.recv().await.unwrap();
        if let ChatEvent::Disconnected { reason } = event {
            assert_eq!(reason.as_deref(), Some("client shut down"));
        } else {
            panic!("expected Disconnected, got {event:?}");
        }
        assert!(!client.is_connected());

        // The handle refuses further traffic.
        assert!(matches!(
            client.send_message("late"),
            Err(ChatError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (transport, _sent) = MockTransport::new(vec![]);
        let (connector, _) = ScriptedConnector::new(vec![Ok(transport)]);

        let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
            .await
            .unwrap();
        let _ = events.recv().await; // Connected

        client.shutdown().await;
        client.shutdown().await; // should not panic
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (transport, _sent) = MockTransport::new(vec![]);
        let (connector, _) = ScriptedConnector::new(vec![Ok(transport)]);

        let (client, mut events) = ChatClient::connect(connector, zero_delay_config())
            .await
            .unwrap();
        let _ = events.recv().await; // Connected

        // Drop the client without calling shutdown; the supervisor is
        // aborted and the event channel closes. We just verify we don't
        // hang or panic.
        drop(client);
        while let Some(_event) = events.recv().await {}
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (transport, _sent) = MockTransport::new(vec![]);
        let (connector, _) = ScriptedConnector::new(vec![Ok(transport)]);

        let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
            .await
            .unwrap();
        let _ = events.recv().await; // Connected

        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("ChatClient"));
        assert!(debug_str.contains("state"));

        client.shutdown().await;
    }
}
