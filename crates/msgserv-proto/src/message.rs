//! Typed messages carried by a frame.

use std::borrow::Cow;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// The eight message types understood by client and server.
///
/// The discriminant is the tag byte written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Session request, payload is the username.
    Connect = b'C',
    /// Error report, payload is a human readable reason.
    Error = b'E',
    /// Positive acknowledgement, no payload.
    Ok = b'0',
    /// Negative acknowledgement, no payload.
    No = b'N',
    /// Unicast: `recipient\0text` from a client, `[sender] text` when delivered.
    ToOne = b'T',
    /// Broadcast: `text` from a client, `[sender] text` when delivered.
    Broadcast = b'B',
    /// Connected-user listing: empty request, space separated reply.
    List = b'L',
    /// Orderly session end, no payload.
    Exit = b'X',
}

impl MessageKind {
    /// All kinds, in tag order of the protocol description.
    pub const ALL: [MessageKind; 8] = [
        Self::Connect,
        Self::Error,
        Self::Ok,
        Self::No,
        Self::ToOne,
        Self::Broadcast,
        Self::List,
        Self::Exit,
    ];

    /// The tag byte for this kind.
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Look up a kind by tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Protocol name of the kind, as used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Error => "ERROR",
            Self::Ok => "OK",
            Self::No => "NO",
            Self::ToOne => "TO_ONE",
            Self::Broadcast => "BCAST",
            Self::List => "LIST",
            Self::Exit => "EXIT",
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, ProtocolError> {
        Self::from_tag(tag).ok_or(ProtocolError::InvalidType { tag })
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One message: a kind plus an opaque payload.
///
/// Text payloads are NUL-terminated on the wire so that an empty string still
/// occupies one byte; [`Message::text`] strips the terminator again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message type.
    pub kind: MessageKind,
    /// Raw payload bytes (may be empty).
    pub payload: Bytes,
}

impl Message {
    /// Build a message from a kind and raw payload bytes.
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// A message without payload.
    pub fn empty(kind: MessageKind) -> Self {
        Self {
            kind,
            payload: Bytes::new(),
        }
    }

    /// A message whose payload is a NUL-terminated string.
    pub fn with_text(kind: MessageKind, text: &str) -> Self {
        let mut buf = BytesMut::with_capacity(text.len() + 1);
        buf.put_slice(text.as_bytes());
        buf.put_u8(0);
        Self::new(kind, buf.freeze())
    }

    /// `CONNECT(username)`.
    pub fn connect(username: &str) -> Self {
        Self::with_text(MessageKind::Connect, username)
    }

    /// `ERROR(reason)`.
    pub fn error(reason: &str) -> Self {
        Self::with_text(MessageKind::Error, reason)
    }

    /// `OK()`.
    pub fn ok() -> Self {
        Self::empty(MessageKind::Ok)
    }

    /// `NO()`.
    pub fn no() -> Self {
        Self::empty(MessageKind::No)
    }

    /// `EXIT()`.
    pub fn exit() -> Self {
        Self::empty(MessageKind::Exit)
    }

    /// `LIST()` request as sent by a client.
    pub fn list_request() -> Self {
        Self::empty(MessageKind::List)
    }

    /// `LIST(users)` reply; always carries a payload, possibly an empty string.
    pub fn list_reply(users: &str) -> Self {
        Self::with_text(MessageKind::List, users)
    }

    /// `TO_ONE(recipient\0text)` as sent by a client.
    pub fn to_one(recipient: &str, text: &str) -> Self {
        let mut buf = BytesMut::with_capacity(recipient.len() + text.len() + 2);
        buf.put_slice(recipient.as_bytes());
        buf.put_u8(0);
        buf.put_slice(text.as_bytes());
        buf.put_u8(0);
        Self::new(MessageKind::ToOne, buf.freeze())
    }

    /// `BCAST(text)` as sent by a client.
    pub fn broadcast(text: &str) -> Self {
        Self::with_text(MessageKind::Broadcast, text)
    }

    /// A routed message as it reaches a recipient: `"[sender] text"`.
    pub fn delivery(kind: MessageKind, sender: &str, text: &str) -> Self {
        Self::with_text(kind, &format!("[{sender}] {text}"))
    }

    /// Value of the `length` header field: tag byte plus payload.
    pub fn wire_len(&self) -> usize {
        1 + self.payload.len()
    }

    /// `true` if the frame carries payload bytes.
    pub fn has_payload(&self) -> bool {
        !self.payload.is_empty()
    }

    /// Payload interpreted as text, without the trailing NUL terminator.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(strip_nul(&self.payload))
    }

    /// Split a client `TO_ONE` payload into `(recipient, text)`.
    ///
    /// Returns `None` when the payload has no recipient separator.
    pub fn split_to_one(&self) -> Option<(String, String)> {
        let pos = self.payload.iter().position(|b| *b == 0)?;
        let recipient = String::from_utf8_lossy(&self.payload[..pos]).into_owned();
        let text = String::from_utf8_lossy(strip_nul(&self.payload[pos + 1..])).into_owned();
        Some((recipient, text))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_payload() {
            write!(f, "{}({:?})", self.kind, self.text())
        } else {
            write!(f, "{}()", self.kind)
        }
    }
}

fn strip_nul(bytes: &[u8]) -> &[u8] {
    match bytes.split_last() {
        Some((&0, rest)) => rest,
        _ => bytes,
    }
}
