//! Connection - Handles an individual client connection.
//!
//! Each Connection is one Worker task with the following lifecycle:
//!
//! ```text
//! Authenticating ── CONNECT accepted, OK sent ──▶ Serving ── EXIT / EOF / cancel ──▶ Closed
//!       │                                                                           ▲
//!       └──────────── refused, ERROR sent ──────────────────────────────────────────┘
//! ```
//!
//! Cancellation is only observed while the Worker waits for the next frame.
//! Once a frame has been read the request runs to completion, so shutdown
//! never interrupts a registry mutation or a delivery.

use std::sync::Arc;

use msgserv_proto::{FrameReader, Message, MessageKind, TransportError, split};
use tokio::net::UnixStream;
use tokio::net::unix::OwnedReadHalf;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, field, info, instrument, warn};

use crate::error::CONNECT_EXPECTED;
use crate::router::{Broadcast, Router, Unicast};
use crate::state::{ConnectionId, Hub, SessionHandle, SharedWriter, TaskTicket};

/// A client connection handler.
pub struct Connection {
    conn: ConnectionId,
    stream: UnixStream,
    hub: Arc<Hub>,
    ticket: TaskTicket,
}

impl Connection {
    pub fn new(conn: ConnectionId, stream: UnixStream, hub: Arc<Hub>, ticket: TaskTicket) -> Self {
        Self {
            conn,
            stream,
            hub,
            ticket,
        }
    }

    /// Run the connection until the client leaves or the Worker is cancelled.
    ///
    /// A closed peer is the normal way for a session to end and is not
    /// reported as an error.
    #[instrument(skip(self), fields(conn = %self.conn, user = field::Empty), name = "connection")]
    pub async fn run(self) -> Result<(), TransportError> {
        let Self {
            conn,
            stream,
            hub,
            ticket,
        } = self;
        let (mut reader, writer) = split(stream, hub.max_frame_len());
        let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(writer));

        // Phase 1: wait for CONNECT; the only cancellation point before the
        // registry is touched.
        let first = tokio::select! {
            biased;
            _ = ticket.token().cancelled() => {
                debug!("Cancelled before authentication");
                close(&writer).await;
                return Ok(());
            }
            first = reader.receive() => first,
        };

        let session = match authenticate(&hub, conn, first, &writer).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                close(&writer).await;
                return Ok(());
            }
            Err(e) => {
                close(&writer).await;
                return Err(e);
            }
        };

        Span::current().record("user", session.username.as_str());
        info!("Session started");

        // Phase 2: serve requests until EXIT, EOF or cancellation
        let result = serve(&hub, &session, &mut reader, ticket.token()).await;

        if let Some(released) = hub.sessions.disconnect(&session.username, conn) {
            close(&released).await;
        }
        info!("Session ended");

        match result {
            Err(e) if e.is_peer_closed() => Ok(()),
            other => other,
        }
    }
}

/// Handle the first frame of a connection.
///
/// Returns the new session on success. Refusals are answered with an `ERROR`
/// frame and yield `Ok(None)`.
async fn authenticate(
    hub: &Hub,
    conn: ConnectionId,
    first: Result<Message, TransportError>,
    writer: &SharedWriter,
) -> Result<Option<SessionHandle>, TransportError> {
    let msg = match first {
        Ok(msg) => msg,
        Err(TransportError::PeerClosed) => {
            info!("Client disconnected before CONNECT");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    if msg.kind != MessageKind::Connect {
        warn!(kind = %msg.kind, "Expected CONNECT");
        send_reply(writer, Message::error(CONNECT_EXPECTED)).await?;
        return Ok(None);
    }

    let username = msg.text().into_owned();

    // Hold our own writer lock until OK is out, so no routed message can
    // reach the client first.
    let mut guard = writer.lock().await;
    if let Err(e) = hub.sessions.connect(&username, conn, Arc::clone(writer)) {
        info!(user = %e.username(), code = e.error_code(), "Connection refused");
        return match guard.send(e.to_reply()).await {
            Ok(_) | Err(TransportError::PeerClosed) => Ok(None),
            Err(err) => Err(err),
        };
    }

    if let Err(e) = guard.send(Message::ok()).await {
        drop(guard);
        hub.sessions.disconnect(&username, conn);
        if e.is_peer_closed() {
            info!(user = %username, "Client vanished before OK");
            return Ok(None);
        }
        return Err(e);
    }
    drop(guard);

    Ok(Some(SessionHandle {
        username,
        conn,
        writer: Arc::clone(writer),
    }))
}

/// Request loop of an authenticated session.
async fn serve(
    hub: &Hub,
    session: &SessionHandle,
    reader: &mut FrameReader<OwnedReadHalf>,
    token: &CancellationToken,
) -> Result<(), TransportError> {
    let router = Router::new(hub);

    loop {
        let received = tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!("Worker cancelled");
                return Ok(());
            }
            received = reader.receive() => received,
        };

        let msg = match received {
            Ok(msg) => msg,
            Err(TransportError::PeerClosed) => {
                info!("Client closed the connection");
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "Read error");
                return Err(e);
            }
        };

        debug!(kind = %msg.kind, len = msg.wire_len(), "Received message");

        match msg.kind {
            MessageKind::Exit => {
                info!("Client sent EXIT");
                return Ok(());
            }
            MessageKind::List => router.list(session).await?,
            MessageKind::ToOne => match msg.split_to_one() {
                Some((recipient, text)) => {
                    if let Unicast::Rejected(e) = router.unicast(session, &recipient, &text).await? {
                        debug!(code = e.error_code(), "Unicast rejected");
                    }
                }
                None => warn!("TO_ONE without recipient separator ignored"),
            },
            MessageKind::Broadcast => {
                if let Broadcast::Rejected(e) = router.broadcast(session, &msg.text()).await? {
                    debug!(code = e.error_code(), "Broadcast rejected");
                }
            }
            other => warn!(kind = %other, "Unexpected message ignored"),
        }
    }
}

async fn send_reply(writer: &SharedWriter, msg: Message) -> Result<(), TransportError> {
    match writer.lock().await.send(msg).await {
        Ok(_) | Err(TransportError::PeerClosed) => Ok(()),
        Err(e) => Err(e),
    }
}

async fn close(writer: &SharedWriter) {
    if let Err(e) = writer.lock().await.shutdown().await {
        debug!(error = %e, "Socket shutdown failed");
    }
}
