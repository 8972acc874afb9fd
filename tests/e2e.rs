//! End-to-end tests: a real relay and real clients over localhost.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

use chat_relay::session::GROUP_SESSION_TITLE;
use chat_relay::{
    handle_connection, ChatClient, ClientEvent, RelayServer, SelectOutcome, ServerConfig,
};

const WAIT: Duration = Duration::from_secs(3);

/// Start a relay on an ephemeral port; returns the port as text
async fn spawn_relay() -> String {
    spawn_relay_with(ServerConfig::default()).await
}

async fn spawn_relay_with(config: ServerConfig) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    tokio::spawn(RelayServer::new(config, cmd_rx).run());
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(handle_connection(stream, cmd_tx.clone()));
        }
    });

    port.to_string()
}

struct TestClient {
    client: ChatClient,
    events: mpsc::UnboundedReceiver<ClientEvent>,
}

impl TestClient {
    async fn join(port: &str, name: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = ChatClient::new(tx);
        client.connect("127.0.0.1", port, name).await.unwrap();
        Self { client, events: rx }
    }

    async fn next_event(&mut self) -> ClientEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for client event")
            .expect("event channel closed")
    }

    /// Skip events until one matches the predicate
    async fn wait_for(&mut self, pred: impl Fn(&ClientEvent) -> bool) -> ClientEvent {
        loop {
            let event = self.next_event().await;
            if pred(&event) {
                return event;
            }
        }
    }

    async fn wait_for_roster(&mut self, expected: &[&str]) {
        self.wait_for(|e| match e {
            ClientEvent::RosterChanged { names } => {
                names.iter().map(String::as_str).eq(expected.iter().copied())
            }
            _ => false,
        })
        .await;
    }
}

#[tokio::test]
async fn roster_propagates_on_join_and_leave() {
    let port = spawn_relay().await;

    let mut alice = TestClient::join(&port, "alice").await;
    alice.wait_for_roster(&["alice"]).await;

    let mut bob = TestClient::join(&port, "bob").await;
    alice.wait_for_roster(&["alice", "bob"]).await;
    bob.wait_for_roster(&["alice", "bob"]).await;

    bob.client.disconnect().await;
    bob.wait_for(|e| matches!(e, ClientEvent::Disconnected)).await;
    alice.wait_for_roster(&["alice"]).await;
}

#[tokio::test]
async fn group_message_reaches_others_without_self_echo() {
    let port = spawn_relay().await;
    let mut alice = TestClient::join(&port, "alice").await;
    let mut bob = TestClient::join(&port, "bob").await;
    alice.wait_for_roster(&["alice", "bob"]).await;
    bob.wait_for_roster(&["alice", "bob"]).await;

    alice.client.send_group_message("hello everyone").await.unwrap();

    // Sender sees its own text from the local append
    alice
        .wait_for(|e| {
            matches!(e, ClientEvent::TranscriptAppended { line, .. } if line == "alice: hello everyone")
        })
        .await;

    // Recipient gets the routed copy in the group session
    match bob
        .wait_for(|e| matches!(e, ClientEvent::TranscriptAppended { .. }))
        .await
    {
        ClientEvent::TranscriptAppended { session, line } => {
            assert_eq!(session, GROUP_SESSION_TITLE);
            assert_eq!(line, "alice: hello everyone");
        }
        _ => unreachable!(),
    }

    // No echo: the sender's transcript holds exactly the local line
    assert_eq!(
        alice.client.transcript(GROUP_SESSION_TITLE).unwrap(),
        ["alice: hello everyone"]
    );
}

#[tokio::test]
async fn private_message_creates_session_lazily() {
    let port = spawn_relay().await;
    let mut alice = TestClient::join(&port, "alice").await;
    let mut bob = TestClient::join(&port, "bob").await;
    alice.wait_for_roster(&["alice", "bob"]).await;
    bob.wait_for_roster(&["alice", "bob"]).await;

    alice
        .client
        .send_private_message("psst", &["bob".to_string()])
        .await
        .unwrap();

    // First inbound from an unknown peer opens the session, with focus
    match bob
        .wait_for(|e| matches!(e, ClientEvent::SessionOpened { session, .. } if session == "alice"))
        .await
    {
        ClientEvent::SessionOpened { focus, .. } => assert!(focus),
        _ => unreachable!(),
    }
    bob.wait_for(|e| {
        matches!(e, ClientEvent::TranscriptAppended { session, line }
            if session == "alice" && line == "alice: psst")
    })
    .await;
    assert_eq!(bob.client.session_count(), 2);

    // Second message appends to the same session
    alice
        .client
        .send_private_message("still there?", &["bob".to_string()])
        .await
        .unwrap();
    bob.wait_for(|e| {
        matches!(e, ClientEvent::TranscriptAppended { line, .. } if line == "alice: still there?")
    })
    .await;
    assert_eq!(bob.client.session_count(), 2);
    assert_eq!(
        bob.client.transcript("alice").unwrap(),
        ["alice: psst", "alice: still there?"]
    );
}

#[tokio::test]
async fn duplicate_name_is_rejected_by_closing() {
    let port = spawn_relay().await;
    let mut alice = TestClient::join(&port, "alice").await;
    alice.wait_for_roster(&["alice"]).await;

    // The relay answers a name conflict by closing the connection
    let mut impostor = TestClient::join(&port, "alice").await;
    impostor
        .wait_for(|e| matches!(e, ClientEvent::Disconnected))
        .await;
    assert!(!impostor.client.is_connected());
    assert!(alice.client.is_connected());
}

#[tokio::test]
async fn private_to_unknown_recipient_is_silent() {
    let port = spawn_relay().await;
    let mut alice = TestClient::join(&port, "alice").await;
    let mut bob = TestClient::join(&port, "bob").await;
    alice.wait_for_roster(&["alice", "bob"]).await;
    bob.wait_for_roster(&["alice", "bob"]).await;

    alice
        .client
        .send_private_message("anyone?", &["ghost".to_string()])
        .await
        .unwrap();

    // Local session still reflects the outbound text
    assert_eq!(
        alice.client.transcript("ghost").unwrap(),
        ["alice: anyone?"]
    );

    // The connection stays healthy: a group roundtrip still works
    alice.client.send_group_message("ping").await.unwrap();
    bob.wait_for(|e| {
        matches!(e, ClientEvent::TranscriptAppended { line, .. } if line == "alice: ping")
    })
    .await;
}

#[tokio::test]
async fn self_chat_selection_is_rejected_with_notice() {
    let port = spawn_relay().await;
    let mut alice = TestClient::join(&port, "alice").await;
    alice.wait_for_roster(&["alice"]).await;

    let outcome = alice.client.select_peers(&["alice".to_string()]);
    assert_eq!(outcome, SelectOutcome::SelfChat);
    alice
        .wait_for(|e| matches!(e, ClientEvent::Notice { .. }))
        .await;
    assert_eq!(alice.client.session_count(), 1);
}

#[tokio::test]
async fn self_addressed_private_send_is_rejected() {
    let port = spawn_relay().await;
    let mut alice = TestClient::join(&port, "alice").await;
    alice.wait_for_roster(&["alice"]).await;

    // The send path enforces the same self-chat rejection as selection:
    // no packet leaves, no session titled with the local name appears
    alice
        .client
        .send_private_message("hi me", &["alice".to_string()])
        .await
        .unwrap();

    alice
        .wait_for(|e| matches!(e, ClientEvent::Notice { .. }))
        .await;
    assert_eq!(alice.client.session_count(), 1);
    assert!(alice.client.transcript("alice").is_none());

    // The connection is still usable afterward
    alice.client.send_group_message("still here").await.unwrap();
    alice
        .wait_for(|e| {
            matches!(e, ClientEvent::TranscriptAppended { line, .. } if line == "alice: still here")
        })
        .await;
    assert_eq!(alice.client.session_count(), 1);
}

#[tokio::test]
async fn group_echo_flag_delivers_back_to_sender() {
    let port = spawn_relay_with(ServerConfig {
        echo_to_sender: true,
    })
    .await;
    let mut alice = TestClient::join(&port, "alice").await;
    alice.wait_for_roster(&["alice"]).await;

    alice.client.send_group_message("echo me").await.unwrap();

    // Local append first, then the routed echo
    alice
        .wait_for(|e| matches!(e, ClientEvent::TranscriptAppended { .. }))
        .await;
    alice
        .wait_for(|e| matches!(e, ClientEvent::TranscriptAppended { .. }))
        .await;
    assert_eq!(
        alice.client.transcript(GROUP_SESSION_TITLE).unwrap(),
        ["alice: echo me", "alice: echo me"]
    );
}

#[tokio::test]
async fn concurrent_senders_each_keep_their_order() {
    const MESSAGES_PER_SENDER: usize = 20;

    let port = spawn_relay().await;
    let alice = TestClient::join(&port, "alice").await;
    let bob = TestClient::join(&port, "bob").await;
    let mut carol = TestClient::join(&port, "carol").await;
    carol.wait_for_roster(&["alice", "bob", "carol"]).await;

    let send_all = |tc: TestClient, name: &'static str| async move {
        for i in 0..MESSAGES_PER_SENDER {
            tc.client
                .send_group_message(&format!("{} {}", name, i))
                .await
                .unwrap();
        }
        tc
    };
    let alice_task = tokio::spawn(send_all(alice, "alice"));
    let bob_task = tokio::spawn(send_all(bob, "bob"));

    let mut from_alice = Vec::new();
    let mut from_bob = Vec::new();
    while from_alice.len() + from_bob.len() < 2 * MESSAGES_PER_SENDER {
        match carol
            .wait_for(|e| matches!(e, ClientEvent::TranscriptAppended { .. }))
            .await
        {
            ClientEvent::TranscriptAppended { line, .. } => {
                if let Some(rest) = line.strip_prefix("alice: alice ") {
                    from_alice.push(rest.parse::<usize>().unwrap());
                } else if let Some(rest) = line.strip_prefix("bob: bob ") {
                    from_bob.push(rest.parse::<usize>().unwrap());
                } else {
                    panic!("unexpected line: {}", line);
                }
            }
            _ => unreachable!(),
        }
    }

    // Each sender's stream arrives in its own send order
    assert_eq!(from_alice, (0..MESSAGES_PER_SENDER).collect::<Vec<_>>());
    assert_eq!(from_bob, (0..MESSAGES_PER_SENDER).collect::<Vec<_>>());

    let _ = alice_task.await.unwrap();
    let _ = bob_task.await.unwrap();
}
