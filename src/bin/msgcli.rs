//! msgcli - interactive client for msgserv.
//!
//! Usage: `msgcli <username> [--socket PATH] [--attempts N] [--retry-delay-ms MS]`

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use msgserv::client::{ClientSession, SessionEnd, stdin_lines};
use msgserv::shutdown::TerminationSignals;
use msgserv_proto::{DEFAULT_CONNECT_ATTEMPTS, connect_with_retry};
use tracing::debug;

#[derive(Parser)]
#[command(name = "msgcli")]
#[command(about = "Chat client for a local msgserv server")]
#[command(version)]
struct Cli {
    /// Username to connect as
    username: String,

    /// Server socket path
    #[arg(short, long, default_value = "./tmp/msgsock")]
    socket: PathBuf,

    /// Connection attempts before giving up
    #[arg(long, default_value_t = DEFAULT_CONNECT_ATTEMPTS)]
    attempts: u32,

    /// Delay between connection attempts, in milliseconds
    #[arg(long, default_value_t = 1000)]
    retry_delay_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    msgserv::telemetry::init("warn");

    let cli = Cli::parse();

    let stream = connect_with_retry(
        &cli.socket,
        cli.attempts,
        Duration::from_millis(cli.retry_delay_ms),
    )
    .await
    .with_context(|| format!("cannot connect to {}", cli.socket.display()))?;

    let signals = TerminationSignals::install().context("cannot install signal handlers")?;

    let session = ClientSession::handshake(stream, &cli.username).await?;

    let end = session
        .run(stdin_lines(), tokio::io::stdout(), async {
            let name = signals.recv().await;
            debug!(signal = name, "Signal received");
        })
        .await?;

    if end == SessionEnd::ServerClosed {
        eprintln!("Il server ha chiuso la connessione");
    }
    debug!(?end, "Session finished");
    Ok(())
}
