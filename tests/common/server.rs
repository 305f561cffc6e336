//! Test server management.
//!
//! Runs a msgserv instance inside the test runtime, bound to a socket in a
//! temporary directory.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use msgserv::Server;
use msgserv::config::Config;
use msgserv::error::ServerError;
use msgserv::shutdown::ShutdownReport;
use msgserv::state::Hub;
use msgserv::users::AllowList;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::client::TestClient;

/// A test server instance.
pub struct TestServer {
    dir: TempDir,
    socket_path: PathBuf,
    log_path: PathBuf,
    hub: Arc<Hub>,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<ShutdownReport, ServerError>>>,
}

impl TestServer {
    /// Spawn a server for the given users with a short flush interval.
    pub async fn spawn(users: &[&str]) -> anyhow::Result<Self> {
        Self::spawn_with(users, Duration::from_millis(50)).await
    }

    /// Spawn a server with a custom delivery log flush interval.
    pub async fn spawn_with(users: &[&str], flush_interval: Duration) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let socket_path = dir.path().join("run").join("msgsock");
        let log_path = dir.path().join("deliveries.log");

        let mut config = Config::default();
        config.server.socket_path = socket_path.clone();
        config.server.log_file = Some(log_path.clone());
        config.writer.flush_interval_ms = flush_interval.as_millis() as u64;

        let server = Server::bind_with(&config, AllowList::from_names(users.iter().copied())).await?;
        let hub = Arc::clone(server.hub());

        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async move {
            let _ = stopped.await;
        }));

        Ok(Self {
            dir,
            socket_path,
            log_path,
            hub,
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Open a connection without sending `CONNECT`.
    pub async fn connect_raw(&self) -> anyhow::Result<TestClient> {
        TestClient::connect(&self.socket_path).await
    }

    /// Open a connection and log in, failing unless the server answers `OK`.
    pub async fn connect(&self, username: &str) -> anyhow::Result<TestClient> {
        let mut client = self.connect_raw().await?;
        client.login(username).await?;
        Ok(client)
    }

    /// Poll the shared state until `predicate` holds.
    pub async fn wait_until<F>(&self, predicate: F) -> anyhow::Result<()>
    where
        F: Fn(&Hub) -> bool,
    {
        for _ in 0..200 {
            if predicate(&self.hub) {
                return Ok(());
            }
            sleep(Duration::from_millis(10)).await;
        }
        anyhow::bail!("condition not reached within 2 seconds")
    }

    /// Wait until `username` has no live session.
    pub async fn wait_offline(&self, username: &str) -> anyhow::Result<()> {
        self.wait_until(|hub| !hub.sessions.is_online(username)).await
    }

    /// Trigger graceful shutdown and wait for it to finish.
    pub async fn shutdown(&mut self) -> anyhow::Result<ShutdownReport> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let handle = self
            .handle
            .take()
            .ok_or_else(|| anyhow::anyhow!("server already shut down"))?;
        let report = tokio::time::timeout(Duration::from_secs(10), handle).await???;
        Ok(report)
    }

    /// Contents of the delivery log file.
    pub fn read_log(&self) -> anyhow::Result<String> {
        Ok(std::fs::read_to_string(&self.log_path)?)
    }

    pub fn data_dir(&self) -> &Path {
        self.dir.path()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
