//! Allow-list loader.
//!
//! The allow-list is a plain text file with one username per line. It is read
//! once at start-up and fixes the set of usernames for the process lifetime.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

/// Usernames must be strictly shorter than this many bytes.
pub const MAX_USERNAME_LEN: usize = 256;

/// Errors raised while loading the allow-list.
#[derive(Debug, Error)]
pub enum AllowListError {
    #[error("failed to read allow-list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid username on line {line}: {reason}")]
    InvalidUsername { line: usize, reason: &'static str },
}

/// The set of usernames allowed to connect, in file order.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    names: Vec<String>,
}

impl AllowList {
    /// Build an allow-list from already validated names.
    ///
    /// Invalid and duplicate names are dropped.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let names = names
            .into_iter()
            .map(Into::into)
            .filter(|name| validate_username(name).is_ok() && seen.insert(name.clone()))
            .collect();
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Bytes needed to hold every username, space separated.
    pub fn directory_capacity(&self) -> usize {
        self.names.iter().map(|name| name.len() + 1).sum()
    }
}

/// Check a single username.
pub fn validate_username(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty username");
    }
    if name.len() >= MAX_USERNAME_LEN {
        return Err("username too long");
    }
    if !name.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err("username must be alphanumeric");
    }
    Ok(())
}

/// Parse allow-list text.
pub fn parse_allow_list(content: &str) -> Result<AllowList, AllowListError> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let name = raw.trim_end_matches('\r');
        if name.trim().is_empty() {
            continue;
        }
        validate_username(name).map_err(|reason| AllowListError::InvalidUsername {
            line: idx + 1,
            reason,
        })?;
        if !seen.insert(name) {
            warn!(line = idx + 1, user = %name, "Duplicate username in allow-list ignored");
            continue;
        }
        names.push(name.to_string());
    }

    Ok(AllowList { names })
}

/// Read and parse the allow-list file.
pub fn load_allow_list(path: impl AsRef<Path>) -> Result<AllowList, AllowListError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| AllowListError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let list = parse_allow_list(&content)?;
    info!(path = %path.display(), users = list.len(), "Allow-list loaded");
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_blank_and_duplicates() {
        let list = parse_allow_list("alice\n\nbob\r\nalice\n").unwrap();
        assert_eq!(list.names(), ["alice", "bob"]);
        assert_eq!(list.directory_capacity(), 10);
    }

    #[test]
    fn test_parse_rejects_invalid_line() {
        let err = parse_allow_list("alice\nbad name\n").unwrap_err();
        assert!(matches!(err, AllowListError::InvalidUsername { line: 2, .. }));
    }

    #[test]
    fn test_username_length_bound() {
        assert!(validate_username(&"a".repeat(MAX_USERNAME_LEN - 1)).is_ok());
        assert!(validate_username(&"a".repeat(MAX_USERNAME_LEN)).is_err());
        assert!(validate_username("caf\u{e9}").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_allow_list("/definitely/not/here.txt").unwrap_err();
        assert!(matches!(err, AllowListError::Io { .. }));
    }

    #[test]
    fn test_from_names_filters() {
        let list = AllowList::from_names(["alice", "", "bob", "alice", "x y"]);
        assert_eq!(list.names(), ["alice", "bob"]);
    }
}
