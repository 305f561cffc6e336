//! Framed transport halves over a Unix domain socket.
//!
//! [`FrameReader`] and [`FrameWriter`] wrap the [`MessageCodec`] in tokio's
//! `FramedRead`/`FramedWrite` and fold every "the other side went away"
//! condition into [`TransportError::PeerClosed`].

use std::io;
use std::path::Path;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use crate::codec::{MessageCodec, HEADER_LEN};
use crate::error::TransportError;
use crate::message::Message;

/// Number of connection attempts a client makes before giving up.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;

/// Pause between two connection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Receiving half of a framed connection.
#[derive(Debug)]
pub struct FrameReader<R> {
    framed: FramedRead<R, MessageCodec>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a reader with the given codec.
    pub fn new(reader: R, codec: MessageCodec) -> Self {
        Self {
            framed: FramedRead::new(reader, codec),
        }
    }

    /// Read the next message.
    ///
    /// A clean end of stream, including one in the middle of a frame, yields
    /// [`TransportError::PeerClosed`].
    pub async fn receive(&mut self) -> Result<Message, TransportError> {
        match self.framed.next().await {
            Some(Ok(msg)) => Ok(msg),
            Some(Err(e)) => Err(e.into()),
            None => Err(TransportError::PeerClosed),
        }
    }

    /// Consume the wrapper and return the underlying reader.
    pub fn into_inner(self) -> R {
        self.framed.into_inner()
    }
}

/// Sending half of a framed connection.
#[derive(Debug)]
pub struct FrameWriter<W> {
    framed: FramedWrite<W, MessageCodec>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap a writer with the given codec.
    pub fn new(writer: W, codec: MessageCodec) -> Self {
        Self {
            framed: FramedWrite::new(writer, codec),
        }
    }

    /// Encode and flush one message.
    ///
    /// Returns the number of bytes written, header included.
    pub async fn send(&mut self, msg: Message) -> Result<usize, TransportError> {
        let written = HEADER_LEN + msg.wire_len();
        self.framed.send(msg).await?;
        Ok(written)
    }

    /// Shut down the write direction of the stream.
    ///
    /// A peer that already vanished is not an error here.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        match self.framed.close().await {
            Ok(()) => Ok(()),
            Err(e) => match TransportError::from(e) {
                TransportError::PeerClosed => Ok(()),
                other => Err(other),
            },
        }
    }
}

/// Split a connected stream into framed halves sharing one frame limit.
pub fn split(
    stream: UnixStream,
    max_frame_len: usize,
) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
    let (read, write) = stream.into_split();
    (
        FrameReader::new(read, MessageCodec::with_max_len(max_frame_len)),
        FrameWriter::new(write, MessageCodec::with_max_len(max_frame_len)),
    )
}

/// Connect to a server socket, retrying a bounded number of times.
///
/// Every attempt after the first is preceded by `delay`. The error of the
/// last attempt is returned once `attempts` are exhausted.
pub async fn connect_with_retry(
    path: impl AsRef<Path>,
    attempts: u32,
    delay: Duration,
) -> io::Result<UnixStream> {
    let path = path.as_ref();
    let attempts = attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        if attempt > 1 {
            tokio::time::sleep(delay).await;
        }
        match UnixStream::connect(path).await {
            Ok(stream) => {
                debug!(path = %path.display(), attempt, "connected");
                return Ok(stream);
            }
            Err(e) => {
                warn!(path = %path.display(), attempt, attempts, error = %e, "connection attempt failed");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no connection attempt made")))
}
