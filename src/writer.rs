//! Writer - periodically flushes the delivery log to disk.
//!
//! The Writer is the last task to stop: the shutdown coordinator cancels it
//! only after every Worker has exited, and it performs one final flush and
//! `sync_all` before returning.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, info};

use crate::error::ServerError;
use crate::state::{Hub, TaskTicket};
use crate::telemetry::spans;

/// Open (create and truncate) the delivery log file.
pub async fn open_log_file(path: &Path) -> Result<File, ServerError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(|source| ServerError::LogFile {
            path: path.to_path_buf(),
            source,
        })
}

/// The Writer task.
pub struct LogWriter {
    file: File,
    path: PathBuf,
    hub: Arc<Hub>,
    interval: Duration,
    ticket: TaskTicket,
    written: u64,
}

impl LogWriter {
    pub fn new(file: File, path: PathBuf, hub: Arc<Hub>, interval: Duration, ticket: TaskTicket) -> Self {
        Self {
            file,
            path,
            hub,
            interval,
            ticket,
            written: 0,
        }
    }

    /// Flush on every tick until cancelled, then flush one last time.
    ///
    /// Returns the total number of bytes written. A failed write is a
    /// resource fault: delivery records can no longer be persisted.
    pub async fn run(self) -> Result<u64, ServerError> {
        let span = spans::task(self.ticket.role(), self.ticket.id());
        self.run_inner().instrument(span).await
    }

    async fn run_inner(mut self) -> Result<u64, ServerError> {
        info!(path = %self.path.display(), "Delivery log writer started");

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let cancelled = tokio::select! {
                biased;
                _ = self.ticket.token().cancelled() => true,
                _ = ticker.tick() => false,
            };
            if cancelled {
                break;
            }
            self.flush().await?;
        }

        self.flush().await?;
        self.file.sync_all().await.map_err(|e| fault("sync", &e))?;
        info!(bytes = self.written, "Delivery log closed");
        Ok(self.written)
    }

    async fn flush(&mut self) -> Result<usize, ServerError> {
        let chunk = self.hub.log.drain();
        if chunk.bytes.is_empty() {
            return Ok(0);
        }

        self.file.write_all(&chunk.bytes).await.map_err(|e| fault("write", &e))?;
        self.file.flush().await.map_err(|e| fault("flush", &e))?;
        self.written += chunk.bytes.len() as u64;
        debug!(bytes = chunk.bytes.len(), records = chunk.records, "Delivery log flushed");
        Ok(chunk.bytes.len())
    }
}

fn fault(op: &str, err: &std::io::Error) -> ServerError {
    ServerError::ResourceFault(format!("delivery log {op} failed: {err}"))
}
