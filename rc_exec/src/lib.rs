//! # Vehicle control library.
//!
//! This library allows the binaries in the control crate (the control executable and the bench
//! test tools) to share the items defined inside it.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Actuation mapper - converts operator commands into servo and ESC pulse widths
pub mod act_map;

/// Command server - recieves command datagrams from the operator
pub mod cmd_server;

/// Control loop - ties the command server, mapper, actuators and stream together
pub mod control;

/// Drive mode - forwards or reverse, shifted by the operator's gear requests
pub mod drive_mode;

/// Parameters for the control executable
pub mod params;

/// Servo control - drives the steering servo and ESC
pub mod servo_ctrl;

/// Video stream - runs the streaming process for the current operator
pub mod stream;
