//! # msgserv-proto
//!
//! Wire protocol for the msgserv local messaging service.
//!
//! Every unit on the wire is a *frame*:
//!
//! ```text
//! +----------------+-----------+------------------------+
//! | length: u32 NE | tag: u8   | payload: length-1 bytes |
//! +----------------+-----------+------------------------+
//! ```
//!
//! `length` counts the tag byte plus the payload, so a frame without a
//! payload (`OK`, `NO`, `EXIT`, a `LIST` request) always has `length == 1`.
//!
//! ## Quick Start
//!
//! ```rust
//! use msgserv_proto::{Message, MessageKind};
//!
//! let msg = Message::to_one("bob", "hi");
//! assert_eq!(msg.kind, MessageKind::ToOne);
//! assert_eq!(msg.split_to_one(), Some(("bob".to_string(), "hi".to_string())));
//! ```
//!
//! The [`transport`] module wraps the codec around the two halves of a
//! Unix stream and separates the expected "peer closed" outcome from real
//! faults.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod message;
pub mod transport;

pub use self::codec::{MessageCodec, DEFAULT_MAX_FRAME_LEN, HEADER_LEN};
pub use self::error::{ProtocolError, TransportError};
pub use self::message::{Message, MessageKind};
pub use self::transport::{
    connect_with_retry, split, FrameReader, FrameWriter, DEFAULT_CONNECT_ATTEMPTS,
    DEFAULT_RETRY_DELAY,
};
