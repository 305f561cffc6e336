//! Gateway - Unix socket listener that accepts incoming connections.
//!
//! The Gateway is the Dispatcher task: it accepts connections and spawns one
//! Worker ([`Connection`]) per client on the Hub's worker tracker.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::network::Connection;
use crate::state::{Hub, TaskRole, TaskTicket};

/// Pause after a failed `accept` before trying again.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// The Gateway accepts incoming connections and spawns handlers.
pub struct Gateway {
    listener: UnixListener,
    hub: Arc<Hub>,
    ticket: TaskTicket,
}

impl Gateway {
    pub fn new(listener: UnixListener, hub: Arc<Hub>, ticket: TaskTicket) -> Self {
        Self {
            listener,
            hub,
            ticket,
        }
    }

    /// Run the accept loop until cancelled.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) {
        info!("Dispatcher accepting connections");

        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.ticket.token().cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, _addr)) => self.spawn_worker(stream),
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    // Errors such as EMFILE persist; don't spin on them
                    if !backoff(self.ticket.token()).await {
                        break;
                    }
                }
            }
        }

        info!("Dispatcher stopped");
    }

    fn spawn_worker(&self, stream: UnixStream) {
        let conn = self.hub.next_connection_id();
        let ticket = self.hub.tasks.register(TaskRole::Worker);
        let hub = Arc::clone(&self.hub);
        debug!(%conn, task = %ticket.id(), "Connection accepted");

        self.hub.workers.spawn(async move {
            let connection = Connection::new(conn, stream, hub, ticket);
            if let Err(e) = connection.run().await {
                error!(%conn, error = %e, "Connection error");
            }
        });
    }
}

/// Sleep for [`ACCEPT_BACKOFF`]. Returns `false` if cancelled meanwhile.
async fn backoff(token: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_BACKOFF) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_backoff_waits_between_accept_errors() {
        let token = CancellationToken::new();
        let started = Instant::now();
        assert!(backoff(&token).await);
        assert!(started.elapsed() >= ACCEPT_BACKOFF);
    }

    #[tokio::test]
    async fn test_backoff_yields_to_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let started = Instant::now();
        assert!(!backoff(&token).await);
        assert!(started.elapsed() < ACCEPT_BACKOFF);
    }
}
