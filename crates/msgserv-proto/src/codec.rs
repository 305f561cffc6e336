//! Length-prefixed message codec for tokio.
//!
//! This module provides a codec that encodes and decodes [`Message`] values
//! using the tokio codec framework. The length header uses the host's native
//! byte order; there is no explicit versioning.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error::{self, ProtocolError};
use crate::message::{Message, MessageKind};

/// Size of the `length` header in bytes.
pub const HEADER_LEN: usize = 4;

/// Default upper bound on the `length` field of a single frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Tokio codec for encoding/decoding [`Message`] frames.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_len: usize,
}

impl MessageCodec {
    /// Create a codec with [`DEFAULT_MAX_FRAME_LEN`].
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Create a codec with a custom maximum frame length.
    ///
    /// # Arguments
    /// * `max_len` - Maximum value accepted in the `length` field
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(1),
        }
    }

    /// Maximum accepted value of the `length` field.
    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<Message>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&src[..HEADER_LEN]);
        let len = u32::from_ne_bytes(header) as usize;

        if len == 0 {
            return Err(ProtocolError::EmptyFrame);
        }
        if len > self.max_len {
            return Err(ProtocolError::FrameTooLong {
                actual: len,
                limit: self.max_len,
            });
        }

        let frame_len = HEADER_LEN + len;
        if src.len() < frame_len {
            // Not enough data yet - make room for the rest of the frame
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let kind = MessageKind::try_from(src.get_u8())?;
        let payload = src.split_to(len - 1).freeze();

        Ok(Some(Message { kind, payload }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> error::Result<Option<Message>> {
        match self.decode(src)? {
            Some(msg) => Ok(Some(msg)),
            None => {
                // The peer went away mid-frame; whatever is left can never complete.
                if !src.is_empty() {
                    debug!(discarded = src.len(), "partial frame at end of stream");
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> error::Result<()> {
        let len = msg.wire_len();
        if len > self.max_len || len > u32::MAX as usize {
            return Err(ProtocolError::FrameTooLong {
                actual: len,
                limit: self.max_len,
            });
        }

        dst.reserve(HEADER_LEN + len);
        dst.put_u32_ne(len as u32);
        dst.put_u8(msg.kind.tag());
        dst.extend_from_slice(&msg.payload);
        Ok(())
    }
}
