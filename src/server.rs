//! Server assembly: binds the socket, wires the tasks together and runs
//! them until shutdown.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::net::UnixListener;
use tracing::{Instrument, error, info, warn};

use crate::config::Config;
use crate::error::ServerError;
use crate::network::Gateway;
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::state::{Hub, TaskRole};
use crate::telemetry::spans;
use crate::users::{AllowList, load_allow_list};
use crate::writer::{LogWriter, open_log_file};

/// A bound, not yet running server.
pub struct Server {
    hub: Arc<Hub>,
    listener: UnixListener,
    socket_path: PathBuf,
    log_file: File,
    log_path: PathBuf,
    flush_interval: Duration,
}

impl Server {
    /// Load the allow-list named by the configuration and bind.
    pub async fn bind(config: &Config) -> Result<Self, ServerError> {
        let allow = load_allow_list(config.server.users_file()?)?;
        Self::bind_with(config, allow).await
    }

    /// Bind with an allow-list that is already in memory.
    pub async fn bind_with(config: &Config, allow: AllowList) -> Result<Self, ServerError> {
        config.validate()?;
        let socket_path = config.server.socket_path.clone();
        let log_path = config.server.log_file()?.to_path_buf();

        let listener = bind_socket(&socket_path)?;
        info!(path = %socket_path.display(), "Listener bound");

        let log_file = open_log_file(&log_path).await?;
        let hub = Arc::new(Hub::new(&allow, config.limits.max_frame_len));
        info!(users = allow.len(), "Session registry loaded");

        Ok(Self {
            hub,
            listener,
            socket_path,
            log_file,
            log_path,
            flush_interval: config.writer.flush_interval(),
        })
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Run until `shutdown` completes, then shut down gracefully.
    ///
    /// The socket file is removed on the way out. If the Writer fails before
    /// shutdown is requested the server stops and the failure is returned.
    pub async fn run<F>(self, shutdown: F) -> Result<ShutdownReport, ServerError>
    where
        F: Future<Output = ()>,
    {
        let Self {
            hub,
            listener,
            socket_path,
            log_file,
            log_path,
            flush_interval,
        } = self;

        let writer_ticket = hub.tasks.register(TaskRole::Writer);
        let writer = LogWriter::new(log_file, log_path, Arc::clone(&hub), flush_interval, writer_ticket);
        let mut writer_handle = tokio::spawn(writer.run());

        let dispatcher_ticket = hub.tasks.register(TaskRole::Dispatcher);
        let span = spans::task(TaskRole::Dispatcher, dispatcher_ticket.id());
        let gateway = Gateway::new(listener, Arc::clone(&hub), dispatcher_ticket);
        let dispatcher_handle = tokio::spawn(gateway.run().instrument(span));

        let writer_finished = tokio::select! {
            _ = shutdown => None,
            finished = &mut writer_handle => Some(finished),
        };

        let result = match writer_finished {
            None => {
                info!("Termination requested, shutting down");
                ShutdownCoordinator::new(Arc::clone(&hub))
                    .run(dispatcher_handle, writer_handle)
                    .await
            }
            Some(finished) => {
                let err = match finished {
                    Ok(Ok(_)) => ServerError::ResourceFault("delivery log writer stopped".to_string()),
                    Ok(Err(e)) => e,
                    Err(e) => e.into(),
                };
                error!(error = %err, code = err.error_code(), "Writer failed, stopping server");
                hub.tasks.sweep();
                hub.workers.close();
                Err(err)
            }
        };

        remove_socket(&socket_path);
        result
    }
}

/// Create the socket's parent directory, drop any stale socket file and bind.
fn bind_socket(path: &Path) -> Result<UnixListener, ServerError> {
    let bind_err = |source: io::Error| ServerError::Bind {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(bind_err)?;
    }
    match std::fs::remove_file(path) {
        Ok(()) => warn!(path = %path.display(), "Removed stale socket file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(bind_err(e)),
    }
    UnixListener::bind(path).map_err(bind_err)
}

fn remove_socket(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "Failed to remove socket file");
    }
}
