//! Message router.
//!
//! Implements `TO_ONE` unicast, `BCAST` broadcast and `LIST`. Every send to a
//! recipient happens under that recipient's own writer lock, taken after the
//! registry lock has been released, so deliveries to different users run in
//! parallel.
//!
//! A request whose routed form (`"[sender] text"`) would not fit in one frame
//! is refused up front with an `ERROR` to the sender, so an accepted request
//! never fails to encode half-way through a fan-out.

use msgserv_proto::{Message, MessageKind, ProtocolError, TransportError};
use tracing::{debug, warn};

use crate::error::RouteError;
use crate::state::{Hub, Lookup, SessionHandle, SharedWriter};

/// Result of a single send to one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written; a log record was appended.
    Delivered,
    /// The recipient closed its connection mid-send.
    Vanished,
    /// The recipient's socket failed with something other than a close.
    Failed,
}

/// Outcome of a unicast request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unicast {
    Sent(Delivery),
    /// Reported back to the sender as an `ERROR` frame.
    Rejected(RouteError),
}

/// Outcome of a broadcast request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Broadcast {
    Sent(BroadcastReport),
    /// Reported back to the sender as an `ERROR` frame; nobody received it.
    Rejected(RouteError),
}

/// Per-recipient tally of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Snapshot entries that had disconnected by the time their turn came.
    pub skipped: usize,
    pub failed: usize,
}

/// Routes requests from one authenticated session.
pub struct Router<'a> {
    hub: &'a Hub,
}

impl<'a> Router<'a> {
    pub fn new(hub: &'a Hub) -> Self {
        Self { hub }
    }

    /// Deliver `text` from `from` to `recipient`.
    ///
    /// Sending to oneself skips the registry entirely and writes through the
    /// sender's own lock. An unknown or offline recipient, or a text too long
    /// to route, is answered with an `ERROR` frame; only a lost sender
    /// connection is returned as `Err`.
    pub async fn unicast(
        &self,
        from: &SessionHandle,
        recipient: &str,
        text: &str,
    ) -> Result<Unicast, TransportError> {
        if let Err(err) = self.check_len(&from.username, text) {
            self.refuse(from, &err).await?;
            return Ok(Unicast::Rejected(err));
        }

        if recipient == from.username {
            let outcome = self
                .deliver(&from.writer, &from.username, recipient, MessageKind::ToOne, text)
                .await;
            return Ok(Unicast::Sent(outcome));
        }

        let writer = match self.hub.sessions.lookup(recipient) {
            Lookup::Online(writer) => writer,
            Lookup::Unknown | Lookup::Offline => {
                let err = RouteError::recipient_unavailable(recipient);
                self.refuse(from, &err).await?;
                return Ok(Unicast::Rejected(err));
            }
        };

        let outcome = self
            .deliver(&writer, &from.username, recipient, MessageKind::ToOne, text)
            .await;
        Ok(Unicast::Sent(outcome))
    }

    /// Deliver `text` from `from` to every connected user, sender included.
    ///
    /// The recipient list is a snapshot of the directory; users that left
    /// before their turn are skipped.
    pub async fn broadcast(
        &self,
        from: &SessionHandle,
        text: &str,
    ) -> Result<Broadcast, TransportError> {
        if let Err(err) = self.check_len(&from.username, text) {
            self.refuse(from, &err).await?;
            return Ok(Broadcast::Rejected(err));
        }

        let recipients = self.hub.sessions.directory().snapshot();
        let mut report = BroadcastReport::default();

        for recipient in &recipients {
            let Some(writer) = self.hub.sessions.lookup(recipient).into_writer() else {
                debug!(%recipient, "Skipping user that left during broadcast");
                report.skipped += 1;
                continue;
            };
            match self
                .deliver(&writer, &from.username, recipient, MessageKind::Broadcast, text)
                .await
            {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Vanished => report.skipped += 1,
                Delivery::Failed => report.failed += 1,
            }
        }

        debug!(
            user = %from.username,
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "Broadcast complete"
        );
        Ok(Broadcast::Sent(report))
    }

    /// Reply to a `LIST` request with the space separated directory.
    pub async fn list(&self, from: &SessionHandle) -> Result<(), TransportError> {
        let listing = self.listing();
        reply(&from.writer, Message::list_reply(&listing)).await
    }

    /// Current directory listing.
    pub fn listing(&self) -> String {
        self.hub.sessions.directory().render()
    }

    /// Refuse texts whose routed frame would exceed the frame limit.
    fn check_len(&self, sender: &str, text: &str) -> Result<(), RouteError> {
        // tag + "[" + sender + "] " + text + NUL
        let len = 1 + sender.len() + 3 + text.len() + 1;
        let limit = self.hub.max_frame_len();
        if len > limit {
            return Err(RouteError::MessageTooLong { len, limit });
        }
        Ok(())
    }

    async fn refuse(&self, from: &SessionHandle, err: &RouteError) -> Result<(), TransportError> {
        debug!(user = %from.username, code = err.error_code(), "Request refused");
        reply(&from.writer, err.to_reply()).await
    }

    async fn deliver(
        &self,
        writer: &SharedWriter,
        sender: &str,
        recipient: &str,
        kind: MessageKind,
        text: &str,
    ) -> Delivery {
        let msg = Message::delivery(kind, sender, text);
        let result = writer.lock().await.send(msg).await;
        match result {
            Ok(_) => {
                self.hub.log.record(sender, recipient, text);
                Delivery::Delivered
            }
            Err(TransportError::PeerClosed) => {
                debug!(%recipient, "Recipient vanished mid-send");
                Delivery::Vanished
            }
            Err(e) => {
                warn!(%recipient, error = %e, "Delivery failed");
                Delivery::Failed
            }
        }
    }
}

/// Send a server reply to the requesting session.
///
/// A reply that cannot be encoded is dropped with a warning; the session
/// itself is still fine.
async fn reply(writer: &SharedWriter, msg: Message) -> Result<(), TransportError> {
    let kind = msg.kind;
    match writer.lock().await.send(msg).await {
        Ok(_) => Ok(()),
        Err(TransportError::Protocol(e @ ProtocolError::FrameTooLong { .. })) => {
            warn!(%kind, error = %e, "Reply dropped");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
