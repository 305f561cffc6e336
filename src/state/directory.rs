//! Active-user directory.
//!
//! Ordered list of connected usernames, in connection order. Mutations happen
//! only while the session registry lock is held (registry, then directory);
//! `LIST` reads take the directory lock alone.

use parking_lot::Mutex;

#[derive(Debug)]
pub struct Directory {
    users: Mutex<Vec<String>>,
    capacity: usize,
}

impl Directory {
    /// Create an empty directory sized for `capacity` bytes of listing text.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            users: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Append a user. Returns `false` if the user is already listed.
    pub(crate) fn insert(&self, username: &str) -> bool {
        let mut users = self.users.lock();
        if users.iter().any(|u| u == username) {
            return false;
        }
        users.push(username.to_string());
        true
    }

    /// Remove a user. Returns `false` if the user was not listed.
    pub(crate) fn remove(&self, username: &str) -> bool {
        let mut users = self.users.lock();
        match users.iter().position(|u| u == username) {
            Some(pos) => {
                users.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&self) -> usize {
        let mut users = self.users.lock();
        let n = users.len();
        users.clear();
        n
    }

    /// Copy of the current membership, in connection order.
    pub fn snapshot(&self) -> Vec<String> {
        self.users.lock().clone()
    }

    /// Space separated listing, as sent in a `LIST` reply.
    pub fn render(&self) -> String {
        let users = self.users.lock();
        let mut out = String::with_capacity(self.capacity);
        for (i, user) in users.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(user);
        }
        out
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.lock().iter().any(|u| u == username)
    }

    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_in_connection_order() {
        let dir = Directory::with_capacity(16);
        assert_eq!(dir.render(), "");
        assert!(dir.insert("bob"));
        assert!(dir.insert("alice"));
        assert!(!dir.insert("bob"));
        assert_eq!(dir.render(), "bob alice");
        assert_eq!(dir.snapshot(), vec!["bob".to_string(), "alice".to_string()]);
    }

    #[test]
    fn test_remove() {
        let dir = Directory::with_capacity(16);
        dir.insert("alice");
        dir.insert("bob");
        dir.insert("carol");
        assert!(dir.remove("bob"));
        assert!(!dir.remove("bob"));
        assert_eq!(dir.render(), "alice carol");
        assert!(!dir.contains("bob"));
        assert_eq!(dir.clear(), 2);
        assert!(dir.is_empty());
    }
}
