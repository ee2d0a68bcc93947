//! # Network Module
//!
//! Network parameters shared by the vehicle executable and the test clients. Commands travel over
//! a single connectionless (UDP) channel, with one command per datagram.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Port the vehicle listens for commands on.
pub const DEFAULT_CMD_PORT: u16 = 8080;

/// Largest command datagram the vehicle will read.
pub const MAX_CMD_DATAGRAM_LEN: usize = 1024;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Network parameters, loaded from `net.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetParams {
    /// Endpoint the command socket is bound to, for example `"0.0.0.0:8080"`.
    pub cmd_endpoint: String,

    /// Maximum time in milliseconds a receive blocks before returning control to the caller.
    ///
    /// This bounds how long a shutdown request may go unnoticed.
    pub recv_timeout_ms: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for NetParams {
    fn default() -> Self {
        Self {
            cmd_endpoint: format!("0.0.0.0:{}", DEFAULT_CMD_PORT),
            recv_timeout_ms: 200,
        }
    }
}
