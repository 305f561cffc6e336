//! Telemetry utilities: tracing initialisation and standard spans.

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_filter` when it is set. Output goes to
/// stderr so it never mixes with chat output on stdout.
pub fn init(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Standardized span constructors for server observability.
pub mod spans {
    use tracing::{Span, info_span};

    use crate::state::{TaskId, TaskRole};

    /// Span for a long-lived server task (Dispatcher or Writer).
    pub fn task(role: TaskRole, id: TaskId) -> Span {
        info_span!("task", role = %role, task = %id)
    }

    /// Span for a client-side task.
    pub fn client(role: &'static str, user: &str) -> Span {
        info_span!("client", role = role, user = %user)
    }
}
