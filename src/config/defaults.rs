//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

use std::path::PathBuf;

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_socket_path() -> PathBuf {
    PathBuf::from("./tmp/msgsock")
}

// =============================================================================
// Writer Defaults
// =============================================================================

pub fn default_flush_interval_ms() -> u64 {
    2000
}

// =============================================================================
// Limit Defaults
// =============================================================================

pub fn default_max_frame_len() -> usize {
    msgserv_proto::DEFAULT_MAX_FRAME_LEN
}
