//! Session registry.
//!
//! Maps every allow-listed username to its connection state. The key set is
//! fixed at load time; connecting and disconnecting only swap the entry's
//! link in place.
//!
//! Lock order is registry, then directory, then (outside both) the per-entry
//! writer lock. The registry lock is a `parking_lot` mutex and is never held
//! across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use msgserv_proto::FrameWriter;
use parking_lot::Mutex;
use tokio::net::unix::OwnedWriteHalf;
use tracing::debug;

use super::ConnectionId;
use super::directory::Directory;
use crate::error::SessionError;
use crate::users::AllowList;

/// Per-entry lock serializing writes to one connected user's socket.
pub type SharedWriter = Arc<tokio::sync::Mutex<FrameWriter<OwnedWriteHalf>>>;

/// Live connection state of a session entry.
#[derive(Debug)]
struct Link {
    conn: ConnectionId,
    writer: SharedWriter,
}

#[derive(Debug, Default)]
struct SessionEntry {
    link: Option<Link>,
}

/// An authenticated connection as seen by the router.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub username: String,
    pub conn: ConnectionId,
    pub writer: SharedWriter,
}

/// Outcome of a registry lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Not on the allow-list.
    Unknown,
    /// Allow-listed but not connected.
    Offline,
    /// Connected; the writer is the user's per-entry lock.
    Online(SharedWriter),
}

impl Lookup {
    pub fn into_writer(self) -> Option<SharedWriter> {
        match self {
            Self::Online(writer) => Some(writer),
            Self::Unknown | Self::Offline => None,
        }
    }
}

/// Authoritative map from username to live connection state.
#[derive(Debug)]
pub struct SessionRegistry {
    entries: Mutex<HashMap<String, SessionEntry>>,
    directory: Directory,
    lookups: AtomicU64,
}

impl SessionRegistry {
    /// Preload one offline entry per allow-listed username.
    pub fn new(allow: &AllowList) -> Self {
        let entries = allow
            .names()
            .iter()
            .map(|name| (name.clone(), SessionEntry::default()))
            .collect();
        Self {
            entries: Mutex::new(entries),
            directory: Directory::with_capacity(allow.directory_capacity()),
            lookups: AtomicU64::new(0),
        }
    }

    /// Resolve a username to its connection state.
    pub fn lookup(&self, username: &str) -> Lookup {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let entries = self.entries.lock();
        match entries.get(username) {
            None => Lookup::Unknown,
            Some(SessionEntry { link: None }) => Lookup::Offline,
            Some(SessionEntry { link: Some(link) }) => Lookup::Online(Arc::clone(&link.writer)),
        }
    }

    /// Admit a connection for `username`.
    ///
    /// The unknown-user check, the already-connected check, installing the
    /// link and adding the user to the directory all happen in one critical
    /// section. The caller is expected to hold `writer` locked until its `OK`
    /// reply is written, so no routed message can overtake it.
    pub fn connect(
        &self,
        username: &str,
        conn: ConnectionId,
        writer: SharedWriter,
    ) -> Result<(), SessionError> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(username)
            .ok_or_else(|| SessionError::UnknownUser(username.to_string()))?;
        if entry.link.is_some() {
            return Err(SessionError::AlreadyConnected(username.to_string()));
        }

        *entry = SessionEntry {
            link: Some(Link { conn, writer }),
        };
        self.directory.insert(username);
        debug!(user = %username, %conn, "Session installed");
        Ok(())
    }

    /// Tear down `username`'s session if it still belongs to `conn`.
    ///
    /// Resets the entry and removes the user from the directory in one
    /// critical section. The released writer is returned so the caller can
    /// shut the socket down outside the lock. A second call for the same
    /// connection returns `None`.
    pub fn disconnect(&self, username: &str, conn: ConnectionId) -> Option<SharedWriter> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(username)?;
        match &entry.link {
            Some(link) if link.conn == conn => {}
            _ => return None,
        }

        let link = entry.link.take()?;
        self.directory.remove(username);
        debug!(user = %username, %conn, "Session released");
        Some(link.writer)
    }

    /// Reset every entry and empty the directory.
    pub fn destroy_all(&self) -> Vec<SharedWriter> {
        let mut entries = self.entries.lock();
        let writers: Vec<SharedWriter> = entries
            .values_mut()
            .filter_map(|entry| entry.link.take())
            .map(|link| link.writer)
            .collect();
        self.directory.clear();
        writers
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Number of [`SessionRegistry::lookup`] calls so far.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Whether `username` is connected. Does not count as a lookup.
    pub fn is_online(&self, username: &str) -> bool {
        self.entries
            .lock()
            .get(username)
            .is_some_and(|entry| entry.link.is_some())
    }

    /// Number of connected users.
    pub fn online_count(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.link.is_some())
            .count()
    }
}
