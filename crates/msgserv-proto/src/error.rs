//! Error types for framing and transport.

use std::io;

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Errors raised while encoding or decoding a frame.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The type tag is not one of the eight defined message kinds.
    #[error("invalid message type tag: {tag:#04x}")]
    InvalidType {
        /// The offending tag byte.
        tag: u8,
    },

    /// A frame announced `length == 0`; the tag byte always counts.
    #[error("empty frame: length must be at least 1")]
    EmptyFrame,

    /// The announced frame length exceeds the configured limit.
    #[error("frame too long: {actual} bytes (limit {limit})")]
    FrameTooLong {
        /// Length announced (or required) by the frame.
        actual: usize,
        /// Configured maximum.
        limit: usize,
    },
}

impl ProtocolError {
    /// Get a static error code string for log labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::InvalidType { .. } => "invalid_type",
            Self::EmptyFrame => "empty_frame",
            Self::FrameTooLong { .. } => "frame_too_long",
        }
    }
}

/// Outcome of a failed `send`/`receive` on a framed transport.
///
/// [`TransportError::PeerClosed`] is the expected disconnect signal and is
/// always reported separately from genuine faults.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The other side closed the connection (EOF on read, broken pipe on write).
    #[error("peer closed the connection")]
    PeerClosed,

    /// A malformed frame was received or could not be encoded.
    #[error("transport protocol error: {0}")]
    Protocol(ProtocolError),

    /// Any other I/O failure.
    #[error("transport I/O error: {0}")]
    Io(io::Error),
}

impl TransportError {
    /// `true` for the expected "other side went away" outcome.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, Self::PeerClosed)
    }
}

/// I/O error kinds that mean the peer is gone rather than that something broke.
pub(crate) fn is_peer_closed_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        if is_peer_closed_kind(err.kind()) {
            Self::PeerClosed
        } else {
            Self::Io(err)
        }
    }
}

impl From<ProtocolError> for TransportError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(io_err) => io_err.into(),
            other => Self::Protocol(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broken_pipe_is_peer_closed() {
        let err: TransportError = io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe").into();
        assert!(err.is_peer_closed());
    }

    #[test]
    fn test_other_io_error_is_not_peer_closed() {
        let err: TransportError =
            io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, TransportError::Io(_)));
        assert_eq!(err.to_string(), "transport I/O error: denied");
    }

    #[test]
    fn test_protocol_io_error_is_unwrapped() {
        let err: TransportError =
            ProtocolError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset")).into();
        assert!(err.is_peer_closed());

        let err: TransportError = ProtocolError::InvalidType { tag: b'?' }.into();
        assert!(matches!(
            err,
            TransportError::Protocol(ProtocolError::InvalidType { tag: b'?' })
        ));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ProtocolError::EmptyFrame.error_code(), "empty_frame");
        assert_eq!(
            ProtocolError::FrameTooLong { actual: 10, limit: 5 }.error_code(),
            "frame_too_long"
        );
    }
}
