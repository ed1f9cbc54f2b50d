#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration-style client tests driven through a loopback transport.
//!
//! The test plays the relay's role on the server half of the loopback and
//! verifies the full client behavior: join acknowledgment, chat round-trips,
//! and the reconnect state machine including identity replay and the
//! name-stolen-during-outage case.

mod common;

use std::time::Duration;

use chat_relay::protocol::{ClientEvent, MessagePayload, ServerEvent};
use chat_relay::{ChatClient, ChatConfig, ChatError, ChatEvent, ConnectionState};

use common::{loopback_pair, ScriptedConnector};

/// Await the next event, panicking after two seconds of silence.
async fn next_event(events: &mut tokio::sync::mpsc::Receiver<ChatEvent>) -> ChatEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Drain events until `pred` matches, panicking after three seconds.
async fn wait_for(
    events: &mut tokio::sync::mpsc::Receiver<ChatEvent>,
    pred: impl Fn(&ChatEvent) -> bool,
) -> ChatEvent {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for a matching event")
}

fn zero_delay_config() -> ChatConfig {
    ChatConfig::default().with_reconnect_delay(Duration::ZERO)
}

// ════════════════════════════════════════════════════════════════════
// Join flow
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn join_is_acknowledged_by_the_join_broadcast() {
    let (transport, mut server) = loopback_pair();
    let connector = ScriptedConnector::new(vec![Ok(transport)]);
    let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
        .await
        .unwrap();

    assert!(matches!(next_event(&mut events).await, ChatEvent::Connected));
    assert!(!client.is_joined());

    client.join("alice").unwrap();
    assert_eq!(
        server.recv_client_event().await,
        ClientEvent::Join {
            username: "alice".into()
        }
    );

    server.acknowledge_join("alice", &["alice"]);
    assert_eq!(
        next_event(&mut events).await,
        ChatEvent::UserJoined {
            username: "alice".into()
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        ChatEvent::Roster {
            users: vec!["alice".into()]
        }
    );
    assert!(client.is_joined());
    assert_eq!(client.username().await.as_deref(), Some("alice"));

    client.shutdown().await;
}

#[tokio::test]
async fn a_refused_join_leaves_the_client_unjoined() {
    let (transport, mut server) = loopback_pair();
    let connector = ScriptedConnector::new(vec![Ok(transport)]);
    let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
        .await
        .unwrap();
    let _ = next_event(&mut events).await; // Connected

    client.join("alice").unwrap();
    let _ = server.recv_client_event().await;
    server.refuse_join_name_taken();

    let event = next_event(&mut events).await;
    assert!(matches!(event, ChatEvent::ServerError { .. }));
    assert!(!client.is_joined());

    client.shutdown().await;
}

#[tokio::test]
async fn a_join_broadcast_for_someone_else_is_not_an_acknowledgment() {
    let (transport, mut server) = loopback_pair();
    let connector = ScriptedConnector::new(vec![Ok(transport)]);
    let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
        .await
        .unwrap();
    let _ = next_event(&mut events).await; // Connected

    client.join("alice").unwrap();
    let _ = server.recv_client_event().await;

    // Another participant joins first; same broadcast shape, different name.
    server.send_event(&ServerEvent::Message(MessagePayload::Join {
        username: "bob".into(),
    }));
    let _ = next_event(&mut events).await; // UserJoined bob
    assert!(!client.is_joined());

    server.acknowledge_join("alice", &["bob", "alice"]);
    wait_for(&mut events, |e| matches!(e, ChatEvent::Roster { .. })).await;
    assert!(client.is_joined());

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Chat traffic
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn chat_broadcast_round_trips_back_to_the_author() {
    let (transport, mut server) = loopback_pair();
    let connector = ScriptedConnector::new(vec![Ok(transport)]);
    let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
        .await
        .unwrap();
    let _ = next_event(&mut events).await; // Connected

    client.join("alice").unwrap();
    let _ = server.recv_client_event().await;
    server.acknowledge_join("alice", &["alice"]);
    wait_for(&mut events, |e| matches!(e, ChatEvent::Roster { .. })).await;

    client.send_message("hi").unwrap();
    assert_eq!(
        server.recv_client_event().await,
        ClientEvent::SendMessage { text: "hi".into() }
    );

    // The relay echoes the author's own message; it arrives like any other.
    server.send_event(&ServerEvent::Message(MessagePayload::Chat {
        username: "alice".into(),
        text: "hi".into(),
    }));
    assert_eq!(
        next_event(&mut events).await,
        ChatEvent::Chat {
            username: "alice".into(),
            text: "hi".into()
        }
    );

    client.shutdown().await;
}

#[tokio::test]
async fn roster_snapshots_replace_one_another() {
    let (transport, mut server) = loopback_pair();
    let connector = ScriptedConnector::new(vec![Ok(transport)]);
    let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
        .await
        .unwrap();
    let _ = next_event(&mut events).await; // Connected

    server.send_event(&ServerEvent::UserList {
        users: vec!["alice".into()],
    });
    server.send_event(&ServerEvent::UserList {
        users: vec!["alice".into(), "bob".into()],
    });

    assert_eq!(
        next_event(&mut events).await,
        ChatEvent::Roster {
            users: vec!["alice".into()]
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        ChatEvent::Roster {
            users: vec!["alice".into(), "bob".into()]
        }
    );

    let _ = server;
    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Reconnection
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn mid_session_loss_reconnects_and_replays_the_name() {
    let (first, mut server1) = loopback_pair();
    let (second, mut server2) = loopback_pair();
    let connector = ScriptedConnector::new(vec![Ok(first), Ok(second)]);

    let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
        .await
        .unwrap();
    let _ = next_event(&mut events).await; // Connected

    client.join("carol").unwrap();
    let _ = server1.recv_client_event().await;
    server1.acknowledge_join("carol", &["carol"]);
    wait_for(&mut events, |e| matches!(e, ChatEvent::Roster { .. })).await;
    assert!(client.is_joined());

    // Sever the connection: dropping the server half reads as a close.
    drop(server1);

    assert!(matches!(
        next_event(&mut events).await,
        ChatEvent::ConnectionLost { .. }
    ));
    assert!(!client.is_joined());
    assert_eq!(
        next_event(&mut events).await,
        ChatEvent::Reconnecting {
            attempt: 1,
            max_attempts: 3
        }
    );

    // The replacement transport carries the replayed join before anything else.
    assert_eq!(
        server2.recv_client_event().await,
        ClientEvent::Join {
            username: "carol".into()
        }
    );
    assert!(matches!(
        next_event(&mut events).await,
        ChatEvent::Reconnected
    ));
    assert_eq!(client.state(), ConnectionState::Connected);

    server2.acknowledge_join("carol", &["carol"]);
    wait_for(&mut events, |e| matches!(e, ChatEvent::Roster { .. })).await;
    assert!(client.is_joined());

    client.shutdown().await;
}

#[tokio::test]
async fn name_stolen_during_outage_surfaces_and_client_stays_unjoined() {
    let (first, mut server1) = loopback_pair();
    let (second, mut server2) = loopback_pair();
    let connector = ScriptedConnector::new(vec![Ok(first), Ok(second)]);

    let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
        .await
        .unwrap();
    let _ = next_event(&mut events).await; // Connected

    client.join("carol").unwrap();
    let _ = server1.recv_client_event().await;
    server1.acknowledge_join("carol", &["carol"]);
    wait_for(&mut events, |e| matches!(e, ChatEvent::Roster { .. })).await;

    drop(server1);
    wait_for(&mut events, |e| matches!(e, ChatEvent::Reconnected)).await;

    // Someone claimed "carol" while we were away; the replay is refused.
    assert_eq!(
        server2.recv_client_event().await,
        ClientEvent::Join {
            username: "carol".into()
        }
    );
    server2.refuse_join_name_taken();

    let event = wait_for(&mut events, |e| matches!(e, ChatEvent::ServerError { .. })).await;
    if let ChatEvent::ServerError { text } = event {
        assert!(text.contains("already in use"));
    }
    // Transport is up, but the client must not claim a session it lost.
    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(!client.is_joined());

    client.shutdown().await;
}

#[tokio::test]
async fn transport_error_mid_session_drives_the_same_reconnect_path() {
    let (first, mut server1) = loopback_pair();
    let (second, mut server2) = loopback_pair();
    let connector = ScriptedConnector::new(vec![Ok(first), Ok(second)]);

    let (mut client, mut events) = ChatClient::connect(connector, zero_delay_config())
        .await
        .unwrap();
    let _ = next_event(&mut events).await; // Connected

    client.join("erin").unwrap();
    let _ = server1.recv_client_event().await;
    server1.acknowledge_join("erin", &["erin"]);
    wait_for(&mut events, |e| matches!(e, ChatEvent::Roster { .. })).await;

    server1.send_error("connection reset by peer");

    let event = next_event(&mut events).await;
    if let ChatEvent::ConnectionLost { reason } = event {
        assert!(reason.unwrap().contains("connection reset"));
    } else {
        panic!("expected ConnectionLost, got {event:?}");
    }

    wait_for(&mut events, |e| matches!(e, ChatEvent::Reconnected)).await;
    assert_eq!(
        server2.recv_client_event().await,
        ClientEvent::Join {
            username: "erin".into()
        }
    );

    client.shutdown().await;
}

#[tokio::test]
async fn sends_while_reconnecting_are_refused_without_touching_the_transport() {
    let (first, mut server1) = loopback_pair();
    // No replacement transport: every redial is refused while we probe state.
    let connector = ScriptedConnector::new(vec![Ok(first)]);
    let config = ChatConfig::default().with_reconnect_delay(Duration::from_millis(200));

    let (mut client, mut events) = ChatClient::connect(connector, config).await.unwrap();
    let _ = next_event(&mut events).await; // Connected

    client.join("frank").unwrap();
    let _ = server1.recv_client_event().await;
    drop(server1);

    wait_for(&mut events, |e| matches!(e, ChatEvent::ConnectionLost { .. })).await;
    assert_eq!(client.state(), ConnectionState::Reconnecting);
    assert!(matches!(
        client.send_message("anyone there?"),
        Err(ChatError::NotConnected)
    ));

    let event = wait_for(&mut events, |e| {
        matches!(e, ChatEvent::ReconnectFailed { .. })
    })
    .await;
    assert_eq!(event, ChatEvent::ReconnectFailed { attempts: 3 });
    assert_eq!(client.state(), ConnectionState::Disconnected);

    client.shutdown().await;
}
