//! Client session state machine.
//!
//! After the handshake three tasks share the connection:
//!
//! - **Sender** reads input lines, parses them and writes frames.
//! - **Receiver** reads frames and prints them.
//! - the **coordinator** (the caller of [`ClientSession::run`]) waits for an
//!   external interrupt or an internal [`ClientEvent`].
//!
//! An interrupt cancels both tasks. `PeerClosed` from the Receiver cancels
//! only the Sender, since the Receiver has already stopped. `SenderFinished`
//! cancels nothing: after `EXIT` the server closes the connection and the
//! Receiver reports that in turn.

use std::future::Future;
use std::io;

use msgserv_proto::{
    DEFAULT_MAX_FRAME_LEN, FrameReader, FrameWriter, Message, MessageKind, TransportError, split,
};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info};

use super::command::{Command, CommandError, USAGE};
use crate::telemetry::spans;

/// Client-side failures.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered `CONNECT` with `ERROR`.
    #[error("{0}")]
    Rejected(String),

    #[error("unexpected reply to CONNECT: {0}")]
    UnexpectedReply(MessageKind),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("output error: {0}")]
    Output(#[from] io::Error),

    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Internal notifications sent to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    /// The Receiver saw the server close the connection.
    PeerClosed,
    /// The Sender stopped on its own (`EXIT` sent, or end of input).
    SenderFinished,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user sent `EXIT` (or input ended) and the server closed.
    Exited,
    /// The server closed the connection on its own.
    ServerClosed,
    /// An external termination signal arrived.
    Interrupted,
}

/// An authenticated client connection.
pub struct ClientSession {
    username: String,
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
}

impl ClientSession {
    /// Send `CONNECT(username)` and wait for the verdict.
    pub async fn handshake(stream: UnixStream, username: &str) -> Result<Self, ClientError> {
        let (mut reader, mut writer) = split(stream, DEFAULT_MAX_FRAME_LEN);
        writer.send(Message::connect(username)).await?;

        let reply = reader.receive().await?;
        match reply.kind {
            MessageKind::Ok => {
                info!(user = %username, "Connected");
                Ok(Self {
                    username: username.to_string(),
                    reader,
                    writer,
                })
            }
            MessageKind::Error => Err(ClientError::Rejected(reply.text().into_owned())),
            other => Err(ClientError::UnexpectedReply(other)),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Run the Sender and Receiver until the session ends.
    ///
    /// `input` yields lines typed by the user; a closed channel means end of
    /// input and is treated like `%EXIT`. Received messages are rendered to
    /// `output`, one per line.
    pub async fn run<O, F>(
        self,
        input: mpsc::Receiver<String>,
        output: O,
        interrupt: F,
    ) -> Result<SessionEnd, ClientError>
    where
        O: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        let Self {
            username,
            reader,
            writer,
        } = self;

        let (events_tx, mut events_rx) = mpsc::channel(4);
        let sender_token = CancellationToken::new();
        let receiver_token = CancellationToken::new();

        let sender = tokio::spawn(
            run_sender(writer, input, events_tx.clone(), sender_token.clone())
                .instrument(spans::client("sender", &username)),
        );
        let receiver = tokio::spawn(
            run_receiver(reader, output, events_tx, receiver_token.clone())
                .instrument(spans::client("receiver", &username)),
        );

        tokio::pin!(interrupt);
        let mut sender_finished = false;
        let end = loop {
            tokio::select! {
                _ = &mut interrupt => {
                    debug!("Interrupted, stopping sender and receiver");
                    sender_token.cancel();
                    receiver_token.cancel();
                    break SessionEnd::Interrupted;
                }
                event = events_rx.recv() => match event {
                    Some(ClientEvent::SenderFinished) => sender_finished = true,
                    Some(ClientEvent::PeerClosed) | None => {
                        sender_token.cancel();
                        break if sender_finished {
                            SessionEnd::Exited
                        } else {
                            SessionEnd::ServerClosed
                        };
                    }
                },
            }
        };

        let sent = sender.await?;
        let received = receiver.await?;
        sent?;
        received?;
        Ok(end)
    }
}

/// How a received frame is shown to the user.
pub fn render(msg: &Message) -> Option<String> {
    let text = msg.text();
    match msg.kind {
        MessageKind::Error => Some(format!("[ERROR] {text}")),
        MessageKind::List => Some(format!("[LIST] {text}")),
        MessageKind::ToOne => Some(text.into_owned()),
        MessageKind::Broadcast => Some(format!("[BCAST]{text}")),
        _ => None,
    }
}

async fn run_sender(
    mut writer: FrameWriter<OwnedWriteHalf>,
    mut input: mpsc::Receiver<String>,
    events: mpsc::Sender<ClientEvent>,
    token: CancellationToken,
) -> Result<(), ClientError> {
    loop {
        let line = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            line = input.recv() => line,
        };

        let command = match line {
            None => Command::Exit,
            Some(line) => match Command::parse(&line) {
                Ok(command) => command,
                Err(CommandError::Empty) => continue,
                Err(e) => {
                    eprintln!("{e}\n{USAGE}");
                    continue;
                }
            },
        };

        let finished = command == Command::Exit;
        let result = writer.send(command.to_message()).await;
        match result {
            Ok(_) if !finished => {}
            Ok(_) | Err(TransportError::PeerClosed) => {
                let _ = events.send(ClientEvent::SenderFinished).await;
                return Ok(());
            }
            Err(e) => {
                let _ = events.send(ClientEvent::SenderFinished).await;
                return Err(e.into());
            }
        }
    }
}

async fn run_receiver<O>(
    mut reader: FrameReader<OwnedReadHalf>,
    mut output: O,
    events: mpsc::Sender<ClientEvent>,
    token: CancellationToken,
) -> Result<(), ClientError>
where
    O: AsyncWrite + Unpin,
{
    let result = loop {
        let received = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            received = reader.receive() => received,
        };

        match received {
            Ok(msg) => {
                if let Err(e) = print(&mut output, &msg).await {
                    break Err(e.into());
                }
            }
            Err(TransportError::PeerClosed) => {
                debug!("Server closed the connection");
                break Ok(());
            }
            Err(e) => break Err(e.into()),
        }
    };

    let _ = events.send(ClientEvent::PeerClosed).await;
    result
}

async fn print<O: AsyncWrite + Unpin>(output: &mut O, msg: &Message) -> io::Result<()> {
    let Some(line) = render(msg) else {
        debug!(kind = %msg.kind, "Unprintable message ignored");
        return Ok(());
    };
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        assert_eq!(
            render(&Message::error("bob: utente non connesso")).as_deref(),
            Some("[ERROR] bob: utente non connesso")
        );
        assert_eq!(
            render(&Message::list_reply("alice bob")).as_deref(),
            Some("[LIST] alice bob")
        );
        assert_eq!(
            render(&Message::delivery(MessageKind::ToOne, "alice", "hi")).as_deref(),
            Some("[alice] hi")
        );
        assert_eq!(
            render(&Message::delivery(MessageKind::Broadcast, "alice", "hello")).as_deref(),
            Some("[BCAST][alice] hello")
        );
        assert_eq!(render(&Message::ok()), None);
    }
}
