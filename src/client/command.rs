//! Parsing of client input lines.

use msgserv_proto::Message;
use thiserror::Error;

/// Character that introduces a command and may not appear in message text.
pub const RESERVED: char = '%';

/// Shown when an input line cannot be parsed.
pub const USAGE: &str = "\
Comandi disponibili:
  %EXIT                 disconnessione dal server
  %LIST                 elenco degli utenti connessi
  %ONE <utente> <testo> messaggio a un singolo utente
  <testo>               messaggio a tutti gli utenti connessi
Il testo puo' contenere solo caratteri stampabili, escluso '%'.";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    List,
    ToOne { recipient: String, text: String },
    Broadcast(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty line")]
    Empty,
    #[error("text contains a non-printable or reserved character")]
    InvalidCharacter,
    #[error("%ONE needs a recipient and a message")]
    MissingText,
    #[error("unknown command")]
    UnknownCommand,
}

impl Command {
    /// Parse one line of input, without its line terminator.
    ///
    /// `%EXIT` and `%LIST` match as prefixes. `%ONE` needs a space between
    /// recipient and text, and non-empty text. Any other line that does not
    /// start with `%` is a broadcast.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim_end_matches(['\r', '\n']);

        if line.starts_with("%EXIT") {
            return Ok(Self::Exit);
        }
        if line.starts_with("%LIST") {
            return Ok(Self::List);
        }
        if let Some(rest) = line.strip_prefix("%ONE ") {
            let (recipient, text) = rest.split_once(' ').ok_or(CommandError::MissingText)?;
            if text.is_empty() {
                return Err(CommandError::MissingText);
            }
            if !is_printable(rest) {
                return Err(CommandError::InvalidCharacter);
            }
            return Ok(Self::ToOne {
                recipient: recipient.to_string(),
                text: text.to_string(),
            });
        }
        if line.starts_with(RESERVED) {
            return Err(CommandError::UnknownCommand);
        }
        if line.is_empty() {
            return Err(CommandError::Empty);
        }
        if !is_printable(line) {
            return Err(CommandError::InvalidCharacter);
        }
        Ok(Self::Broadcast(line.to_string()))
    }

    /// The frame sent for this command.
    pub fn to_message(&self) -> Message {
        match self {
            Self::Exit => Message::exit(),
            Self::List => Message::list_request(),
            Self::ToOne { recipient, text } => Message::to_one(recipient, text),
            Self::Broadcast(text) => Message::broadcast(text),
        }
    }
}

/// Printable ASCII, space included, and never the reserved character.
pub fn is_printable(text: &str) -> bool {
    text.chars()
        .all(|c| (c.is_ascii_graphic() || c == ' ') && c != RESERVED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgserv_proto::MessageKind;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("%EXIT"), Ok(Command::Exit));
        assert_eq!(Command::parse("%EXITnow\n"), Ok(Command::Exit));
        assert_eq!(Command::parse("%LIST"), Ok(Command::List));
        assert_eq!(
            Command::parse("%ONE bob hi there\n"),
            Ok(Command::ToOne {
                recipient: "bob".into(),
                text: "hi there".into()
            })
        );
        assert_eq!(
            Command::parse("hello"),
            Ok(Command::Broadcast("hello".into()))
        );
    }

    #[test]
    fn test_parse_rejections() {
        assert_eq!(Command::parse("%ONE bob"), Err(CommandError::MissingText));
        assert_eq!(Command::parse("%ONE bob "), Err(CommandError::MissingText));
        assert_eq!(Command::parse("%ONE bob 50%"), Err(CommandError::InvalidCharacter));
        assert_eq!(Command::parse("%HELP"), Err(CommandError::UnknownCommand));
        assert_eq!(Command::parse("%ONEbob hi"), Err(CommandError::UnknownCommand));
        assert_eq!(Command::parse("tab\there"), Err(CommandError::InvalidCharacter));
        assert_eq!(Command::parse("caf\u{e9}"), Err(CommandError::InvalidCharacter));
        assert_eq!(Command::parse("\n"), Err(CommandError::Empty));
    }

    #[test]
    fn test_to_message() {
        let msg = Command::parse("%ONE bob hi").unwrap().to_message();
        assert_eq!(msg.kind, MessageKind::ToOne);
        assert_eq!(msg.split_to_one(), Some(("bob".into(), "hi".into())));
        assert_eq!(Command::Exit.to_message(), Message::exit());
        assert_eq!(Command::List.to_message().wire_len(), 1);
    }
}
