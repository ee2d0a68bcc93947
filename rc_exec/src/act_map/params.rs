//! Parameters structure for the actuation mapper

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::cmd::{AXIS_MAX, AXIS_MIN};
use serde::Deserialize;
use thiserror::Error;

use util::maths::lin_map;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the actuation mapper.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActParams {

    // ---- INPUT ----

    /// Lowest value of the steering, throttle and brake axes in a command.
    pub input_min: i32,

    /// Highest value of the steering, throttle and brake axes in a command.
    pub input_max: i32,

    /// Throttle and brake values at or below this are treated as released.
    pub noise_threshold: i32,

    // ---- STEERING SERVO ----

    /// Pulse for full left steering (input minimum).
    ///
    /// Units: microseconds
    pub servo_min_us: u16,

    /// Pulse for full right steering (input maximum).
    ///
    /// Units: microseconds
    pub servo_max_us: u16,

    // ---- ESC ----

    /// Full reverse or full brake pulse.
    ///
    /// Units: microseconds
    pub motor_min_us: u16,

    /// Neutral (stopped) pulse.
    ///
    /// Units: microseconds
    pub motor_neutral_us: u16,

    /// Full forward pulse.
    ///
    /// Units: microseconds
    pub motor_max_us: u16,

    /// Half width of the band around neutral which is snapped to exactly neutral when the
    /// operator has released both pedals.
    ///
    /// Units: microseconds
    pub dead_band_us: u16,
}

/// Reasons a set of actuation parameters is unusable.
#[derive(Debug, Error, PartialEq)]
pub enum ActParamsError {
    #[error("Input range is empty ({0} >= {1})")]
    EmptyInputRange(i32, i32),

    #[error("Noise threshold {0} lies outside the input range")]
    ThresholdOutOfRange(i32),

    #[error("Servo range is empty ({0} >= {1})")]
    EmptyServoRange(u16, u16),

    #[error("Motor pulses must satisfy min < neutral < max (got {0}, {1}, {2})")]
    MotorRangeOrder(u16, u16, u16),

    #[error("Dead band of {0} us does not fit inside the motor range")]
    DeadBandTooWide(u16),

    #[error("A throttle at the noise threshold maps {0:.1} us from neutral, outside the {1} us dead band")]
    ThresholdOutsideDeadBand(f64, u16),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ActParams {
    /// Check the parameters are consistent.
    ///
    /// Besides range ordering this checks that a throttle or brake at the noise threshold
    /// produces a pulse inside the dead band, which guarantees that released pedals always
    /// command exactly neutral.
    pub fn validate(&self) -> Result<(), ActParamsError> {
        if self.input_min >= self.input_max {
            return Err(ActParamsError::EmptyInputRange(self.input_min, self.input_max))
        }

        if self.noise_threshold < self.input_min || self.noise_threshold >= self.input_max {
            return Err(ActParamsError::ThresholdOutOfRange(self.noise_threshold))
        }

        if self.servo_min_us >= self.servo_max_us {
            return Err(ActParamsError::EmptyServoRange(self.servo_min_us, self.servo_max_us))
        }

        if !(self.motor_min_us < self.motor_neutral_us
            && self.motor_neutral_us < self.motor_max_us)
        {
            return Err(ActParamsError::MotorRangeOrder(
                self.motor_min_us,
                self.motor_neutral_us,
                self.motor_max_us
            ))
        }

        if self.dead_band_us == 0
            || self.dead_band_us > self.motor_neutral_us - self.motor_min_us
            || self.dead_band_us > self.motor_max_us - self.motor_neutral_us
        {
            return Err(ActParamsError::DeadBandTooWide(self.dead_band_us))
        }

        // Largest offset from neutral a thresholded throttle can produce, in either direction
        let input = (self.input_min as f64, self.input_max as f64);
        let neutral = self.motor_neutral_us as f64;
        let threshold = self.noise_threshold as f64;
        let fwd_offset = lin_map(input, (neutral, self.motor_max_us as f64), threshold) - neutral;
        let rev_offset = neutral - lin_map(input, (neutral, self.motor_min_us as f64), threshold);
        let offset = fwd_offset.max(rev_offset);

        // Leave half a microsecond for rounding
        if offset + 0.5 >= self.dead_band_us as f64 {
            return Err(ActParamsError::ThresholdOutsideDeadBand(offset, self.dead_band_us))
        }

        Ok(())
    }

    /// Centre of the steering servo range.
    pub fn servo_centre_us(&self) -> u16 {
        ((self.servo_min_us as u32 + self.servo_max_us as u32) / 2) as u16
    }
}

impl Default for ActParams {
    fn default() -> Self {
        Self {
            input_min: AXIS_MIN,
            input_max: AXIS_MAX,
            noise_threshold: 20,
            servo_min_us: 500,
            servo_max_us: 2500,
            motor_min_us: 1000,
            motor_neutral_us: 1500,
            motor_max_us: 2000,
            dead_band_us: 50,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
