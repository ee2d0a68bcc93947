//! [`ServoDriver`] implementation for the Raspberry Pi hardware PWM peripheral.
//!
//! `PWM0` is available on GPIO 12/18 and `PWM1` on GPIO 13/19, depending on the overlay loaded in
//! `/boot/config.txt`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;

use rppal::pwm::{Channel, Polarity, Pwm};

use super::{ActChannel, ServoDriver, ServoError, PWM_PERIOD_US};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct RpiPwmDriver {
    steering: Pwm,
    motor: Pwm
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RpiPwmDriver {
    /// Enable both PWM channels with a 20 ms period and no output pulse.
    pub fn new(steering_channel: u8, motor_channel: u8) -> Result<Self, ServoError> {
        if steering_channel == motor_channel {
            return Err(ServoError::InvalidChannel(motor_channel))
        }

        Ok(Self {
            steering: open_channel(steering_channel)?,
            motor: open_channel(motor_channel)?
        })
    }
}

impl ServoDriver for RpiPwmDriver {
    fn set_pulse_width(&mut self, channel: ActChannel, pulse_us: u16) -> Result<(), ServoError> {
        if pulse_us as u32 > PWM_PERIOD_US {
            return Err(ServoError::InvalidPulseWidth(pulse_us))
        }

        let pwm = match channel {
            ActChannel::Steering => &self.steering,
            ActChannel::Motor => &self.motor
        };

        pwm.set_pulse_width(Duration::from_micros(pulse_us as u64))
            .map_err(|e| ServoError::Hardware(e.to_string()))
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn open_channel(index: u8) -> Result<Pwm, ServoError> {
    let channel = match index {
        0 => Channel::Pwm0,
        1 => Channel::Pwm1,
        i => return Err(ServoError::InvalidChannel(i))
    };

    Pwm::with_period(
        channel,
        Duration::from_micros(PWM_PERIOD_US as u64),
        Duration::from_micros(0),
        Polarity::Normal,
        true
    ).map_err(|e| ServoError::Hardware(e.to_string()))
}
