//! # Video Stream
//!
//! The vehicle streams video back to whichever operator is currently sending it commands. The
//! video itself is produced by an external program (by default `rpicam-vid`), this module only
//! starts, watches and stops that program.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

/// Child process capability and its real implementation using `std::process`.
pub mod process;

/// Owner of the single active stream session.
pub mod supervisor;

// -----------------------------------------------------------------------------------------------
// EXPORTS
// -----------------------------------------------------------------------------------------------

pub use process::{ChildExit, ChildHandle, CommandLauncher, Launcher, ProcessChild};
pub use supervisor::StreamSupervisor;

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use serde::Deserialize;

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

/// Parameters of the video stream.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamParams {
    /// If false no stream process is ever started.
    pub enabled: bool,

    /// Program producing the stream.
    pub program: String,

    /// Arguments for the program. `{host}`, `{port}` and `{source}` are replaced by the
    /// operator's IP address, the video port and the configured source.
    pub args: Vec<String>,

    /// Video source handed to the program, for example a camera index or device path.
    pub source: String,

    /// Port on the operator to stream to. If unset the stream is sent to the port the
    /// operator's commands come from.
    pub video_port: Option<u16>,

    /// How long a stopping stream process has to exit before it is killed.
    ///
    /// An operator change stops the old stream on the control thread, so command handling and the
    /// safe mode timeout stall for up to this long. The last applied command stays on the
    /// actuators meanwhile. Keep this well under a second on a moving vehicle.
    ///
    /// Units: milliseconds
    pub stop_grace_ms: u64,

    /// Minimum time between two start attempts for the same operator after a failed start or
    /// an unexpected exit.
    ///
    /// Units: milliseconds
    pub restart_backoff_ms: u64,
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

/// Errors from managing the stream process.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Could not start stream program {program:?}: {source}")]
    SpawnError {
        program: String,
        source: std::io::Error
    },

    #[error("Could not signal stream process {0}: {1}")]
    SignalError(u32, std::io::Error),

    #[error("Could not wait for stream process {0}: {1}")]
    WaitError(u32, std::io::Error),
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "rpicam-vid".into(),
            args: vec![
                "-t".into(),
                "0".into(),
                "--inline".into(),
                "-o".into(),
                "udp://{host}:{port}".into(),
            ],
            source: "0".into(),
            video_port: None,
            stop_grace_ms: 2000,
            restart_backoff_ms: 2000,
        }
    }
}
