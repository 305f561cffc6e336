//! Integration tests for the session lifecycle.
//!
//! Covers the handshake, refusals and the release of a username when its
//! connection goes away.

mod common;

use std::time::Duration;

use common::TestServer;
use msgserv::error::CONNECT_EXPECTED;
use msgserv::state::Lookup;
use msgserv_proto::{Message, MessageKind};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

const NOT_ALLOWED: &str = "Non sei abilitato alla connessione su questo server";
const ALREADY_CONNECTED: &str = "Un utente con il tuo username e' gia' connesso";

#[tokio::test]
async fn test_connect_and_list() {
    let server = TestServer::spawn(&["alice", "bob"])
        .await
        .expect("Failed to spawn test server");

    let mut alice = server.connect("alice").await.expect("alice login failed");
    assert_eq!(alice.list().await.expect("LIST failed"), "alice");

    let mut bob = server.connect("bob").await.expect("bob login failed");
    assert_eq!(bob.list().await.expect("LIST failed"), "alice bob");
}

#[tokio::test]
async fn test_unknown_user_refused() {
    let server = TestServer::spawn(&["alice"])
        .await
        .expect("Failed to spawn test server");

    let mut client = server.connect_raw().await.expect("Failed to connect");
    let reply = client.handshake("mallory").await.expect("No reply to CONNECT");
    assert_eq!(reply.kind, MessageKind::Error);
    assert_eq!(reply.text(), NOT_ALLOWED);

    client.expect_closed().await.expect("Connection should be closed");
    assert!(matches!(
        server.hub().sessions.lookup("mallory"),
        Lookup::Unknown
    ));
}

#[tokio::test]
async fn test_duplicate_username_refused() {
    let server = TestServer::spawn(&["alice"])
        .await
        .expect("Failed to spawn test server");

    let mut first = server.connect("alice").await.expect("First login failed");

    let mut second = server.connect_raw().await.expect("Failed to connect");
    let reply = second.handshake("alice").await.expect("No reply to CONNECT");
    assert_eq!(reply.kind, MessageKind::Error);
    assert_eq!(reply.text(), ALREADY_CONNECTED);
    second.expect_closed().await.expect("Connection should be closed");

    // The refusal must not disturb the existing session
    assert_eq!(first.list().await.expect("LIST failed"), "alice");
}

#[tokio::test]
async fn test_concurrent_logins_admit_one() {
    let server = TestServer::spawn(&["alice"])
        .await
        .expect("Failed to spawn test server");

    let mut attempts = Vec::new();
    for _ in 0..8 {
        let mut client = server.connect_raw().await.expect("Failed to connect");
        attempts.push(tokio::spawn(async move {
            let reply = client.handshake("alice").await.expect("No reply to CONNECT");
            (reply, client)
        }));
    }

    let mut accepted = 0;
    let mut clients = Vec::new();
    for attempt in attempts {
        let (reply, client) = attempt.await.expect("Login task panicked");
        match reply.kind {
            MessageKind::Ok => accepted += 1,
            MessageKind::Error => assert_eq!(reply.text(), ALREADY_CONNECTED),
            other => panic!("Unexpected reply: {other}"),
        }
        clients.push(client);
    }

    assert_eq!(accepted, 1);
    assert_eq!(server.hub().sessions.online_count(), 1);
    assert_eq!(server.hub().sessions.directory().snapshot(), vec!["alice".to_string()]);
}

#[tokio::test]
async fn test_first_frame_must_be_connect() {
    let server = TestServer::spawn(&["alice"])
        .await
        .expect("Failed to spawn test server");

    let mut client = server.connect_raw().await.expect("Failed to connect");
    client.send(Message::list_request()).await.expect("Failed to send LIST");

    let reply = client.recv().await.expect("No reply");
    assert_eq!(reply.kind, MessageKind::Error);
    assert_eq!(reply.text(), CONNECT_EXPECTED);
    client.expect_closed().await.expect("Connection should be closed");
    assert_eq!(server.hub().sessions.online_count(), 0);
}

#[tokio::test]
async fn test_exit_releases_username() {
    let server = TestServer::spawn(&["alice", "bob"])
        .await
        .expect("Failed to spawn test server");

    let mut bob = server.connect("bob").await.expect("bob login failed");
    let mut alice = server.connect("alice").await.expect("alice login failed");

    alice.exit().await.expect("Failed to send EXIT");
    alice.expect_closed().await.expect("Connection should be closed");
    server.wait_offline("alice").await.expect("alice still online");

    assert_eq!(bob.list().await.expect("LIST failed"), "bob");

    // The username is free again
    let mut again = server.connect("alice").await.expect("Second login failed");
    assert_eq!(again.list().await.expect("LIST failed"), "bob alice");
}

#[tokio::test]
async fn test_eof_acts_as_exit() {
    let server = TestServer::spawn(&["alice"])
        .await
        .expect("Failed to spawn test server");

    let alice = server.connect("alice").await.expect("alice login failed");
    assert!(server.hub().sessions.is_online("alice"));

    drop(alice);
    server.wait_offline("alice").await.expect("alice still online");
    assert!(server.hub().sessions.directory().is_empty());
}

#[tokio::test]
async fn test_invalid_frame_closes_connection() {
    let server = TestServer::spawn(&["alice"])
        .await
        .expect("Failed to spawn test server");

    let mut stream = UnixStream::connect(server.socket_path())
        .await
        .expect("Failed to connect");

    // Length 1, unknown tag
    let mut frame = 1u32.to_ne_bytes().to_vec();
    frame.push(b'Q');
    stream.write_all(&frame).await.expect("Failed to write frame");

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(5), async {
        use tokio::io::AsyncReadExt;
        stream.read(&mut buf).await
    })
    .await
    .expect("Server did not close the connection");
    assert!(matches!(read, Ok(0) | Err(_)));
    assert_eq!(server.hub().sessions.online_count(), 0);
}

#[tokio::test]
async fn test_unexpected_message_ignored() {
    let server = TestServer::spawn(&["alice"])
        .await
        .expect("Failed to spawn test server");

    let mut alice = server.connect("alice").await.expect("alice login failed");
    alice.send(Message::ok()).await.expect("Failed to send OK");
    alice
        .expect_silence(Duration::from_millis(100))
        .await
        .expect("OK from a client must not be answered");

    // Still serving
    assert_eq!(alice.list().await.expect("LIST failed"), "alice");
}
