//! # Servo Controller Module
//!
//! This module provides a unified servo control interface which can abstract over the different
//! ways the vehicle's steering servo and ESC can be driven. Every backend accepts pulse widths in
//! microseconds on a 50 Hz (20 ms) signal.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// [`ServoDriver`] implementation for the Adafruit PCA9685 16 channel servo driver board.
pub mod pca9685;

/// [`ServoDriver`] implementation for the Raspberry Pi's hardware PWM channels.
#[cfg(all(target_os = "linux", any(target_arch = "arm", target_arch = "aarch64")))]
pub mod rpi_pwm;

/// Simulated [`ServoDriver`] which only records the demanded pulses.
pub mod sim;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Period of the servo/ESC control signal.
///
/// Units: microseconds
pub const PWM_PERIOD_US: u32 = 20_000;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for accessing servo driver hardware.
pub trait ServoDriver {

    /// Set the pulse width of a channel.
    ///
    /// ## Arguments
    /// - `channel` - The actuator to set the pulse width for
    /// - `pulse_us` - The pulse width in microseconds. Must not exceed [`PWM_PERIOD_US`].
    fn set_pulse_width(&mut self, channel: ActChannel, pulse_us: u16) -> Result<(), ServoError>;

}

impl<D> ServoDriver for Box<D>
where
    D: ServoDriver + ?Sized
{
    fn set_pulse_width(&mut self, channel: ActChannel, pulse_us: u16) -> Result<(), ServoError> {
        (**self).set_pulse_width(channel, pulse_us)
    }
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The actuators on the vehicle.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum ActChannel {
    /// Steering servo
    Steering,

    /// Drive motor ESC
    Motor
}

#[derive(thiserror::Error, Debug)]
pub enum ServoError {
    #[error("An I2C error occured")]
    I2c,

    #[error("Pulse width of {0} us exceeds the signal period")]
    InvalidPulseWidth(u16),

    #[error("The driver rejected the demanded output")]
    InvalidInputData,

    #[error("Channel {0} does not exist on this driver")]
    InvalidChannel(u8),

    #[error("Hardware error: {0}")]
    Hardware(String),

    #[error("The {0} servo backend is not supported on this platform")]
    Unsupported(String)
}

/// The hardware used to generate the servo signals, as given in the parameter file.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServoBackend {
    /// No hardware, demands are only logged.
    Sim,

    /// PCA9685 board on an I2C bus.
    Pca9685 {
        i2c_bus: u8,
        address: u8,
        steering_channel: u8,
        motor_channel: u8
    },

    /// Raspberry Pi hardware PWM, channels are 0 (`PWM0`) and 1 (`PWM1`).
    RpiPwm {
        steering_channel: u8,
        motor_channel: u8
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Open the servo driver for the given backend.
pub fn open(backend: &ServoBackend) -> Result<Box<dyn ServoDriver + Send>, ServoError> {
    match backend {
        ServoBackend::Sim => Ok(Box::new(sim::SimDriver::new())),

        #[cfg(all(target_os = "linux", any(target_arch = "arm", target_arch = "aarch64")))]
        ServoBackend::Pca9685 { i2c_bus, address, steering_channel, motor_channel } => {
            let i2c = rppal::i2c::I2c::with_bus(*i2c_bus)
                .map_err(|e| ServoError::Hardware(e.to_string()))?;

            Ok(Box::new(pca9685::Pca9685Driver::new(
                i2c,
                *address,
                *steering_channel,
                *motor_channel
            )?))
        },

        #[cfg(all(target_os = "linux", any(target_arch = "arm", target_arch = "aarch64")))]
        ServoBackend::RpiPwm { steering_channel, motor_channel } => {
            Ok(Box::new(rpi_pwm::RpiPwmDriver::new(*steering_channel, *motor_channel)?))
        },

        #[cfg(not(all(target_os = "linux", any(target_arch = "arm", target_arch = "aarch64"))))]
        other => Err(ServoError::Unsupported(format!("{:?}", other)))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_open_sim() {
        let mut driver = open(&ServoBackend::Sim).unwrap();
        assert!(driver.set_pulse_width(ActChannel::Motor, 1500).is_ok());
    }

    #[test]
    fn test_backend_params() {
        let backend: ServoBackend = toml::from_str(
            "type = \"Pca9685\"\ni2c_bus = 1\naddress = 64\nsteering_channel = 0\nmotor_channel = 1\n"
        ).unwrap();

        assert_eq!(backend, ServoBackend::Pca9685 {
            i2c_bus: 1,
            address: 0x40,
            steering_channel: 0,
            motor_channel: 1
        });
    }
}
