//! Client side of the protocol, used by the `msgcli` binary.

mod command;
mod session;

use std::io::BufRead;

use tokio::sync::mpsc;

pub use command::{Command, CommandError, RESERVED, USAGE, is_printable};
pub use session::{ClientError, ClientEvent, ClientSession, SessionEnd, render};

/// Read stdin on a dedicated thread and forward each line.
///
/// The channel closes at end of input. A blocking thread is used because
/// an interactive terminal read can otherwise hold up runtime shutdown.
pub fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}
