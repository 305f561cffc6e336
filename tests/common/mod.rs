//! Integration test common infrastructure.
//!
//! Provides utilities for running an in-process server on a temporary
//! socket and for speaking the wire protocol from test clients.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;
