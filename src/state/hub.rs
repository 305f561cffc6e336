//! The Hub - central shared state for the server.
//!
//! One `Hub` is built at start-up and handed to every task as an
//! `Arc<Hub>`. Each component carries its own lock; nothing here is a
//! process-wide singleton.

use std::sync::Arc;

use tokio_util::task::TaskTracker;

use super::conn_id::{ConnectionId, ConnectionIdGenerator};
use super::delivery_log::DeliveryLog;
use super::session::SessionRegistry;
use super::tasks::TaskRegistry;
use crate::users::AllowList;

/// Central shared state container.
#[derive(Debug)]
pub struct Hub {
    /// Username to connection state, plus the active-user directory.
    pub sessions: SessionRegistry,

    /// Delivery records waiting for the Writer.
    pub log: DeliveryLog,

    /// Live Dispatcher, Worker and Writer tasks.
    pub tasks: Arc<TaskRegistry>,

    /// Wait-group over Worker tasks, used as the shutdown barrier.
    pub workers: TaskTracker,

    conn_ids: ConnectionIdGenerator,
    max_frame_len: usize,
}

impl Hub {
    pub fn new(allow: &AllowList, max_frame_len: usize) -> Self {
        Self {
            sessions: SessionRegistry::new(allow),
            log: DeliveryLog::new(),
            tasks: TaskRegistry::new(),
            workers: TaskTracker::new(),
            conn_ids: ConnectionIdGenerator::new(),
            max_frame_len,
        }
    }

    /// Id for a freshly accepted connection.
    pub fn next_connection_id(&self) -> ConnectionId {
        self.conn_ids.next()
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}
