//! msgserv - local multi-user messaging over Unix domain sockets.
//!
//! The server authenticates users against a static allow-list, routes
//! unicast and broadcast messages between connected clients and logs every
//! delivery. The wire protocol lives in the `msgserv-proto` crate.
//!
//! Task layout:
//!
//! ```text
//! Gateway (Dispatcher) ──accept──▶ Connection (Worker) ×N ──▶ Router ──▶ recipients
//!                                        │                      │
//!                                        ▼                      ▼
//!                                  SessionRegistry         DeliveryLog ──▶ LogWriter (Writer)
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod network;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod state;
pub mod telemetry;
pub mod users;
pub mod writer;

pub use server::Server;
