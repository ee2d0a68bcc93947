//! # Control Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use crate::{
    act_map::ActParams,
    drive_mode::ModePolicy,
    servo_ctrl::ServoBackend,
    stream::StreamParams,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the control executable, loaded from `rc_exec.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RcExecParams {
    /// Time without a valid command after which the actuators are returned to neutral.
    ///
    /// Units: milliseconds
    pub cmd_timeout_ms: u64,

    /// What happens to the drive mode when the operator address changes.
    pub mode_policy: ModePolicy,

    /// Command to pulse mapping.
    pub act: ActParams,

    /// Hardware generating the servo signals.
    pub servo: ServoBackend,

    /// Video stream back to the operator.
    pub stream: StreamParams,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for RcExecParams {
    fn default() -> Self {
        Self {
            cmd_timeout_ms: 500,
            mode_policy: ModePolicy::default(),
            act: ActParams::default(),
            servo: ServoBackend::Sim,
            stream: StreamParams::default(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
