//! # Drive mode
//!
//! The vehicle is either driving forwards or reversing. The mode only changes when a command
//! carries a gear shift request, and otherwise persists between commands.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::cmd::Gear;
use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Direction the throttle drives the vehicle in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveMode {
    Drive,
    Reverse,
}

/// What happens to the drive mode when a different operator address starts sending commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ModePolicy {
    /// Keep the current mode.
    Sticky,

    /// Go back to [`DriveMode::Drive`].
    ResetOnNewClient,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DriveMode {
    /// The mode after applying a gear request.
    ///
    /// Shifts are immediate, there is no dwell time or interlock against the motor's current
    /// direction.
    pub fn shift(self, gear: Gear) -> Self {
        match gear {
            Gear::Drive => DriveMode::Drive,
            Gear::Reverse => DriveMode::Reverse,
            Gear::Hold => self,
        }
    }
}

impl Default for DriveMode {
    fn default() -> Self {
        DriveMode::Drive
    }
}

impl Default for ModePolicy {
    fn default() -> Self {
        ModePolicy::Sticky
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
