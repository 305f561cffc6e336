//! Test client.
//!
//! Speaks the framed protocol directly so tests can assert on every message
//! the server sends.

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use msgserv_proto::{
    DEFAULT_MAX_FRAME_LEN, FrameReader, FrameWriter, Message, MessageKind, TransportError, split,
};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

/// A test client.
pub struct TestClient {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
}

impl TestClient {
    /// Connect to a test server.
    pub async fn connect(path: &Path) -> anyhow::Result<Self> {
        let stream = UnixStream::connect(path).await?;
        let (reader, writer) = split(stream, DEFAULT_MAX_FRAME_LEN);
        Ok(Self { reader, writer })
    }

    /// Send one message.
    pub async fn send(&mut self, msg: Message) -> anyhow::Result<()> {
        self.writer.send(msg).await?;
        Ok(())
    }

    /// Receive a single message from the server.
    pub async fn recv(&mut self) -> anyhow::Result<Message> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive a message with a timeout.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<Message> {
        Ok(timeout(dur, self.reader.receive()).await??)
    }

    /// Assert that nothing arrives within `dur`.
    pub async fn expect_silence(&mut self, dur: Duration) -> anyhow::Result<()> {
        match timeout(dur, self.reader.receive()).await {
            Err(_) => Ok(()),
            Ok(Ok(msg)) => anyhow::bail!("unexpected message: {msg}"),
            Ok(Err(e)) => anyhow::bail!("unexpected transport outcome: {e}"),
        }
    }

    /// Wait for the server to close the connection.
    pub async fn expect_closed(&mut self) -> anyhow::Result<()> {
        match timeout(Duration::from_secs(5), self.reader.receive()).await? {
            Err(TransportError::PeerClosed) => Ok(()),
            Ok(msg) => anyhow::bail!("expected close, got {msg}"),
            Err(e) => anyhow::bail!("expected close, got error {e}"),
        }
    }

    /// Send `CONNECT` and return the server's verdict.
    pub async fn handshake(&mut self, username: &str) -> anyhow::Result<Message> {
        self.send(Message::connect(username)).await?;
        self.recv().await
    }

    /// Log in, failing unless the server answers `OK`.
    pub async fn login(&mut self, username: &str) -> anyhow::Result<()> {
        let reply = self.handshake(username).await?;
        if reply.kind != MessageKind::Ok {
            anyhow::bail!("login as {username} refused: {reply}");
        }
        Ok(())
    }

    pub async fn to_one(&mut self, recipient: &str, text: &str) -> anyhow::Result<()> {
        self.send(Message::to_one(recipient, text)).await
    }

    pub async fn broadcast(&mut self, text: &str) -> anyhow::Result<()> {
        self.send(Message::broadcast(text)).await
    }

    /// Request the user listing and return it.
    pub async fn list(&mut self) -> anyhow::Result<String> {
        self.send(Message::list_request()).await?;
        let reply = self.recv().await?;
        if reply.kind != MessageKind::List {
            anyhow::bail!("expected LIST reply, got {reply}");
        }
        Ok(reply.text().into_owned())
    }

    pub async fn exit(&mut self) -> anyhow::Result<()> {
        self.send(Message::exit()).await
    }
}
