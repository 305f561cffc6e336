//! msgserv - local multi-user messaging daemon.
//!
//! Usage: `msgserv <users_file> <log_file> [--config FILE] [--socket PATH]`

use std::path::PathBuf;

use clap::Parser;
use msgserv::Server;
use msgserv::config::Config;
use msgserv::shutdown::TerminationSignals;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "msgserv")]
#[command(about = "Local multi-user messaging server over a Unix domain socket")]
#[command(version)]
struct Cli {
    /// Allow-list file, one username per line
    users_file: Option<PathBuf>,

    /// Delivery log file (truncated at start-up)
    log_file: Option<PathBuf>,

    /// Optional TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listening socket path (overrides the configuration)
    #[arg(short, long)]
    socket: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    fn apply(self, config: &mut Config) {
        if let Some(users_file) = self.users_file {
            config.server.users_file = Some(users_file);
        }
        if let Some(log_file) = self.log_file {
            config.server.log_file = Some(log_file);
        }
        if let Some(socket) = self.socket {
            config.server.socket_path = socket;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    msgserv::telemetry::init("info");

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to load config");
            e
        })?,
        None => Config::default(),
    };
    cli.apply(&mut config);

    let signals = TerminationSignals::install().map_err(|e| {
        error!(error = %e, "Failed to install signal handlers");
        e
    })?;

    let server = Server::bind(&config).await.map_err(|e| {
        error!(error = %e, code = e.error_code(), "Failed to start");
        e
    })?;
    info!(socket = %server.socket_path().display(), "Starting msgserv");

    let report = server
        .run(async {
            let name = signals.recv().await;
            info!(signal = name, "Signal received");
        })
        .await
        .map_err(|e| {
            error!(error = %e, code = e.error_code(), "Server stopped with an error");
            e
        })?;

    info!(
        cancelled = report.first_sweep + report.second_sweep,
        log_bytes = report.log_bytes,
        "Shutdown complete"
    );
    Ok(())
}
