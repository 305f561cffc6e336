//! Graceful shutdown.
//!
//! Order of operations once a termination signal arrives:
//!
//! 1. Sweep the task registry: close it, detach the Writer, cancel the
//!    Dispatcher and every Worker.
//! 2. Sweep again to catch anything that registered during the first sweep.
//! 3. Wait for the Dispatcher, then close the Worker tracker and wait until
//!    the last Worker has torn its session down.
//! 4. Cancel the Writer and wait for its final flush.
//!
//! The Writer is cancelled only after step 3, so every record appended by a
//! Worker reaches the final flush.

use std::io;
use std::sync::Arc;

use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::ServerError;
use crate::state::Hub;

/// SIGINT and SIGTERM handlers.
///
/// Installed up front so a failure surfaces at start-up instead of leaving
/// the process without a way to stop gracefully.
pub struct TerminationSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl TerminationSignals {
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the first signal and return its name.
    pub async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

/// Summary of a completed shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks cancelled by the first sweep.
    pub first_sweep: usize,
    /// Tasks cancelled by the second sweep.
    pub second_sweep: usize,
    /// Sessions still installed after every Worker exited.
    pub leftover_sessions: usize,
    /// Bytes written to the delivery log over the Writer's lifetime.
    pub log_bytes: u64,
}

/// Drives the shutdown sequence over a running server's tasks.
pub struct ShutdownCoordinator {
    hub: Arc<Hub>,
}

impl ShutdownCoordinator {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    pub async fn run(
        self,
        dispatcher: JoinHandle<()>,
        writer: JoinHandle<Result<u64, ServerError>>,
    ) -> Result<ShutdownReport, ServerError> {
        let first = self.hub.tasks.sweep();
        let second = self.hub.tasks.sweep();
        info!(
            first = first.cancelled,
            second = second.cancelled,
            "Tasks cancelled"
        );

        let mut writers = first.writers;
        writers.extend(second.writers);

        dispatcher.await?;

        self.hub.workers.close();
        self.hub.workers.wait().await;
        info!("All workers exited");

        if writers.is_empty() {
            warn!("Writer was not registered at shutdown");
        }
        for token in &writers {
            token.cancel();
        }
        let log_bytes = writer.await??;

        let leftover_sessions = self.hub.sessions.destroy_all().len();
        if leftover_sessions > 0 {
            warn!(count = leftover_sessions, "Sessions left behind by workers");
        }

        Ok(ShutdownReport {
            first_sweep: first.cancelled,
            second_sweep: second.cancelled,
            leftover_sessions,
            log_bytes,
        })
    }
}
