//! # Actuation mapper
//!
//! Converts an operator command into the pulse widths sent to the steering servo and ESC.
//!
//! The ESC is bidirectional: pulses above neutral drive forwards, pulses below neutral brake or
//! reverse depending on what the ESC was last doing. Rather than trusting a plain linear map of
//! the throttle the mapper applies a fixed policy:
//!
//! 1. A pressed brake always wins, in either drive mode, and maps down towards the minimum pulse.
//! 2. Otherwise the throttle maps up towards the maximum pulse in drive, or down towards the
//!    minimum pulse in reverse.
//! 3. With both pedals released, any pulse close to neutral is snapped to exactly neutral so the
//!    ESC doesn't creep.
//!
//! The mapping is a pure function of the command and the drive mode.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use params::*;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::cmd::DriveCmd;
use util::maths::{clamp, lin_map_clamped};

use crate::drive_mode::DriveMode;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Pulse widths for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorPulse {
    /// Steering servo pulse.
    ///
    /// Units: microseconds
    pub servo_us: u16,

    /// ESC pulse.
    ///
    /// Units: microseconds
    pub motor_us: u16,
}

/// Maps commands onto actuator pulses using a validated set of [`ActParams`].
#[derive(Debug, Clone)]
pub struct ActMapper {
    params: ActParams,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ActMapper {
    /// Create a new mapper, rejecting inconsistent parameters.
    pub fn new(params: ActParams) -> Result<Self, ActParamsError> {
        params.validate()?;

        Ok(Self { params })
    }

    pub fn params(&self) -> &ActParams {
        &self.params
    }

    /// Centred steering and a stopped motor.
    pub fn neutral(&self) -> ActuatorPulse {
        ActuatorPulse {
            servo_us: self.params.servo_centre_us(),
            motor_us: self.params.motor_neutral_us,
        }
    }

    /// Compute the pulses for a command in the given drive mode.
    pub fn map(&self, cmd: &DriveCmd, mode: DriveMode) -> ActuatorPulse {
        let p = &self.params;

        let servo_us = self.remap(cmd.steering(), (p.servo_min_us, p.servo_max_us));

        let forward_us = self.remap(cmd.throttle(), (p.motor_neutral_us, p.motor_max_us));
        let reverse_us = self.remap(cmd.throttle(), (p.motor_neutral_us, p.motor_min_us));
        let brake_us = self.remap(cmd.brake(), (p.motor_neutral_us, p.motor_min_us));

        let brake_pressed = cmd.brake() > p.noise_threshold;
        let throttle_pressed = cmd.throttle() > p.noise_threshold;

        let mut motor_us = if brake_pressed {
            brake_us
        }
        else {
            match mode {
                DriveMode::Drive => forward_us,
                DriveMode::Reverse => reverse_us,
            }
        };

        // Dead-zone snap
        let dead_low = p.motor_neutral_us - p.dead_band_us;
        let dead_high = p.motor_neutral_us + p.dead_band_us;
        if !brake_pressed && !throttle_pressed && motor_us > dead_low && motor_us < dead_high {
            motor_us = p.motor_neutral_us;
        }

        ActuatorPulse { servo_us, motor_us }
    }

    /// Linearly map an axis value onto a pulse range, clamping both the input and the output.
    ///
    /// `target.0` is the pulse for the lowest input, so inverted ranges are allowed.
    fn remap(&self, value: i32, target: (u16, u16)) -> u16 {
        let input = (self.params.input_min as f64, self.params.input_max as f64);
        let value = clamp(value as f64, input.0, input.1);

        lin_map_clamped(input, (target.0 as f64, target.1 as f64), value).round() as u16
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
