//! Unified error handling for msgserv.
//!
//! This module provides the server-side error hierarchy, with automatic
//! conversions, client reply generation and log labeling. Framing and
//! transport errors live in `msgserv_proto`.

use std::path::PathBuf;

use msgserv_proto::{Message, TransportError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::users::{AllowListError, MAX_USERNAME_LEN};

/// Reply sent when the first frame of a connection is not `CONNECT`.
pub const CONNECT_EXPECTED: &str = "Messaggio di connessione atteso";

// ============================================================================
// Session Errors (authentication)
// ============================================================================

/// Reasons a `CONNECT` is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Non sei abilitato alla connessione su questo server")]
    UnknownUser(String),

    #[error("Un utente con il tuo username e' gia' connesso")]
    AlreadyConnected(String),
}

impl SessionError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownUser(_) => "unknown_user",
            Self::AlreadyConnected(_) => "already_connected",
        }
    }

    /// The username that was refused.
    pub fn username(&self) -> &str {
        match self {
            Self::UnknownUser(name) | Self::AlreadyConnected(name) => name,
        }
    }

    /// The `ERROR` frame sent to the refused client.
    pub fn to_reply(&self) -> Message {
        Message::error(&self.to_string())
    }
}

// ============================================================================
// Route Errors (unicast)
// ============================================================================

/// Routing failures reported back to the sender; the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("{0}: utente non connesso")]
    RecipientUnavailable(String),

    /// The routed frame would exceed the frame length limit.
    #[error("Messaggio troppo lungo")]
    MessageTooLong { len: usize, limit: usize },
}

impl RouteError {
    /// Unknown or offline recipient.
    ///
    /// No username is longer than [`MAX_USERNAME_LEN`], so a longer name is
    /// cut there to keep the reply small.
    pub fn recipient_unavailable(recipient: &str) -> Self {
        let mut end = recipient.len().min(MAX_USERNAME_LEN);
        while !recipient.is_char_boundary(end) {
            end -= 1;
        }
        Self::RecipientUnavailable(recipient[..end].to_string())
    }

    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RecipientUnavailable(_) => "recipient_unavailable",
            Self::MessageTooLong { .. } => "message_too_long",
        }
    }

    /// The `ERROR` frame sent back to the sender.
    pub fn to_reply(&self) -> Message {
        Message::error(&self.to_string())
    }
}

// ============================================================================
// Server Errors (process level)
// ============================================================================

/// Errors that end the server process.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("allow-list error: {0}")]
    AllowList(#[from] AllowListError),

    #[error("failed to bind {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open delivery log {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Shared state or an essential resource can no longer be trusted.
    #[error("resource fault: {0}")]
    ResourceFault(String),

    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ServerError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::AllowList(_) => "allow_list",
            Self::Bind { .. } => "bind",
            Self::LogFile { .. } => "log_file",
            Self::ResourceFault(_) => "resource_fault",
            Self::Task(_) => "task",
            Self::Transport(_) => "transport",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgserv_proto::MessageKind;

    #[test]
    fn test_session_error_codes() {
        assert_eq!(SessionError::UnknownUser("x".into()).error_code(), "unknown_user");
        assert_eq!(
            SessionError::AlreadyConnected("x".into()).error_code(),
            "already_connected"
        );
    }

    #[test]
    fn test_session_error_reply() {
        let reply = SessionError::AlreadyConnected("alice".into()).to_reply();
        assert_eq!(reply.kind, MessageKind::Error);
        assert_eq!(reply.text(), "Un utente con il tuo username e' gia' connesso");
    }

    #[test]
    fn test_route_error_reply() {
        let reply = RouteError::RecipientUnavailable("bob".into()).to_reply();
        assert_eq!(reply.text(), "bob: utente non connesso");
    }

    #[test]
    fn test_recipient_name_bounded() {
        let long = "z".repeat(MAX_USERNAME_LEN * 4);
        let RouteError::RecipientUnavailable(name) = RouteError::recipient_unavailable(&long) else {
            panic!("wrong variant");
        };
        assert_eq!(name.len(), MAX_USERNAME_LEN);

        // Never split a multi-byte character
        let accented = "è".repeat(MAX_USERNAME_LEN);
        let RouteError::RecipientUnavailable(name) = RouteError::recipient_unavailable(&accented) else {
            panic!("wrong variant");
        };
        assert!(name.len() <= MAX_USERNAME_LEN);
        assert!(name.chars().all(|c| c == 'è'));

        assert_eq!(
            RouteError::recipient_unavailable("bob"),
            RouteError::RecipientUnavailable("bob".into())
        );
    }

    #[test]
    fn test_message_too_long_reply() {
        let err = RouteError::MessageTooLong { len: 70_000, limit: 65_536 };
        assert_eq!(err.error_code(), "message_too_long");
        assert_eq!(err.to_reply().text(), "Messaggio troppo lungo");
    }

    #[test]
    fn test_server_error_codes() {
        assert_eq!(ServerError::ResourceFault("x".into()).error_code(), "resource_fault");
    }
}
