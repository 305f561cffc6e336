//! Task registry.
//!
//! Every long-lived server task (Dispatcher, one Worker per connection, the
//! Writer) registers here and receives a [`TaskTicket`]. The ticket carries
//! the task's cancellation token and removes the entry when dropped.
//!
//! Shutdown sweeps the registry: the Writer's token is detached and handed
//! back to the caller, every other task is cancelled. Once the registry is
//! closed, a late registration gets a token that is already cancelled, so a
//! task that raced the sweep stops at its first cancellation point.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Role of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskRole {
    Dispatcher,
    Worker,
    Writer,
}

impl TaskRole {
    pub fn name(self) -> &'static str {
        match self {
            Self::Dispatcher => "dispatcher",
            Self::Worker => "worker",
            Self::Writer => "writer",
        }
    }
}

impl fmt::Display for TaskRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug)]
struct TaskEntry {
    id: TaskId,
    role: TaskRole,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct TaskTable {
    next_id: u64,
    closed: bool,
    entries: Vec<TaskEntry>,
}

/// Result of one shutdown sweep.
#[derive(Debug, Default)]
pub struct Sweep {
    /// Tasks cancelled by this sweep.
    pub cancelled: usize,
    /// Writer tokens detached by this sweep, still live.
    pub writers: Vec<CancellationToken>,
}

/// Registry of live tasks.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    table: Mutex<TaskTable>,
}

impl TaskRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a task and return its ticket.
    ///
    /// After [`TaskRegistry::sweep`] has closed the registry the ticket's
    /// token is cancelled before it is returned and no entry is recorded.
    pub fn register(self: &Arc<Self>, role: TaskRole) -> TaskTicket {
        let token = CancellationToken::new();
        let mut table = self.table.lock();
        table.next_id += 1;
        let id = TaskId(table.next_id);

        if table.closed {
            drop(table);
            debug!(task = %id, %role, "Registration after shutdown began, cancelled");
            token.cancel();
        } else {
            table.entries.push(TaskEntry {
                id,
                role,
                token: token.clone(),
            });
        }

        TaskTicket {
            id,
            role,
            token,
            registry: Arc::clone(self),
        }
    }

    /// Remove a task's entry. Removing an entry twice is harmless.
    pub fn deregister(&self, id: TaskId) -> bool {
        let mut table = self.table.lock();
        match table.entries.iter().position(|e| e.id == id) {
            Some(pos) => {
                table.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Close the registry, detach Writer tokens, cancel everything else and
    /// clear the table.
    pub fn sweep(&self) -> Sweep {
        let entries = {
            let mut table = self.table.lock();
            table.closed = true;
            std::mem::take(&mut table.entries)
        };

        let mut sweep = Sweep::default();
        for entry in entries {
            if entry.role == TaskRole::Writer {
                sweep.writers.push(entry.token);
            } else {
                debug!(task = %entry.id, role = %entry.role, "Cancelling task");
                entry.token.cancel();
                sweep.cancelled += 1;
            }
        }
        sweep
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.table.lock().closed
    }

    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of registered tasks with the given role.
    #[cfg(test)]
    pub(crate) fn count(&self, role: TaskRole) -> usize {
        self.table
            .lock()
            .entries
            .iter()
            .filter(|e| e.role == role)
            .count()
    }
}

/// Handle held by a registered task.
///
/// Dropping the ticket removes the task from the registry.
#[derive(Debug)]
pub struct TaskTicket {
    id: TaskId,
    role: TaskRole,
    token: CancellationToken,
    registry: Arc<TaskRegistry>,
}

impl TaskTicket {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn role(&self) -> TaskRole {
        self.role
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TaskTicket {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_drop_deregisters() {
        let registry = TaskRegistry::new();
        let a = registry.register(TaskRole::Worker);
        let b = registry.register(TaskRole::Worker);
        assert_eq!(registry.count(TaskRole::Worker), 2);
        drop(a);
        assert_eq!(registry.len(), 1);
        drop(b);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_detaches_writer() {
        let registry = TaskRegistry::new();
        let dispatcher = registry.register(TaskRole::Dispatcher);
        let worker = registry.register(TaskRole::Worker);
        let writer = registry.register(TaskRole::Writer);

        let sweep = registry.sweep();
        assert_eq!(sweep.cancelled, 2);
        assert_eq!(sweep.writers.len(), 1);
        assert!(dispatcher.is_cancelled());
        assert!(worker.is_cancelled());
        assert!(!writer.is_cancelled());
        assert!(registry.is_empty());

        sweep.writers[0].cancel();
        assert!(writer.is_cancelled());
    }

    #[test]
    fn test_register_after_close_is_cancelled() {
        let registry = TaskRegistry::new();
        let first = registry.sweep();
        assert_eq!(first.cancelled, 0);
        assert!(registry.is_closed());

        let late = registry.register(TaskRole::Worker);
        assert!(late.is_cancelled());
        assert!(registry.is_empty());

        let second = registry.sweep();
        assert_eq!(second.cancelled, 0);
    }
}
