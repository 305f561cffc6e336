//! State management module.
//!
//! Contains the Hub (shared server state) and the structures it owns.

mod conn_id;
mod delivery_log;
mod directory;
mod hub;
mod session;
mod tasks;

pub use conn_id::{ConnectionId, ConnectionIdGenerator};
pub use delivery_log::{DeliveryLog, Drained, INITIAL_CAPACITY as LOG_INITIAL_CAPACITY, LogBuffer};
pub use directory::Directory;
pub use hub::Hub;
pub use session::{Lookup, SessionHandle, SessionRegistry, SharedWriter};
pub use tasks::{Sweep, TaskId, TaskRegistry, TaskRole, TaskTicket};
