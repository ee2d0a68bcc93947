//! [`ServoDriver`] implementation for the PCA9685 driver

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use pwm_pca9685::{Address, Channel, Pca9685};
use embedded_hal::blocking::i2c::{Write, WriteRead};

use super::{ActChannel, ServoDriver, ServoError, PWM_PERIOD_US};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const MAX_PWM: u16 = 4096;

/// Prescale giving a 50 Hz output from the board's 25 MHz oscillator,
/// `round(25e6 / (4096 * 50)) - 1`.
const PRESCALE_50HZ: u8 = 121;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A PCA9685 board with the steering servo and ESC wired to two of its channels.
pub struct Pca9685Driver<I2C> {
    pwm: Pca9685<I2C>,
    steering: Channel,
    motor: Channel
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<I2C, E> Pca9685Driver<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>
{
    /// Initialise the board at `address` on the given bus and enable its outputs at 50 Hz.
    pub fn new(
        i2c: I2C,
        address: u8,
        steering_channel: u8,
        motor_channel: u8
    ) -> Result<Self, ServoError> {

        let steering = channel_from_index(steering_channel)?;
        let motor = channel_from_index(motor_channel)?;

        let mut pwm = Pca9685::new(i2c, Address::from(address))
            .map_err(map_pca_error)?;
        pwm.set_prescale(PRESCALE_50HZ).map_err(map_pca_error)?;
        pwm.enable().map_err(map_pca_error)?;

        Ok(Self {
            pwm,
            steering,
            motor
        })
    }
}

impl<I2C, E> ServoDriver for Pca9685Driver<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>
{
    fn set_pulse_width(
        &mut self,
        channel: ActChannel,
        pulse_us: u16
    ) -> Result<(), ServoError> {

        // If the pulse is longer than the period return an error
        if pulse_us as u32 > PWM_PERIOD_US {
            return Err(ServoError::InvalidPulseWidth(pulse_us))
        }

        let channel = match channel {
            ActChannel::Steering => self.steering,
            ActChannel::Motor => self.motor
        };

        self.pwm
            .set_channel_on_off(channel, 0, pulse_to_counts(pulse_us))
            .map_err(map_pca_error)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert a pulse width into the number of counts (out of 4096) the output stays high for.
pub fn pulse_to_counts(pulse_us: u16) -> u16 {
    let counts = (pulse_us as u32 * MAX_PWM as u32 + PWM_PERIOD_US / 2) / PWM_PERIOD_US;
    counts.min(MAX_PWM as u32 - 1) as u16
}

fn channel_from_index(index: u8) -> Result<Channel, ServoError> {
    Ok(match index {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        i => return Err(ServoError::InvalidChannel(i))
    })
}

fn map_pca_error<E>(e: pwm_pca9685::Error<E>) -> ServoError {
    match e {
        pwm_pca9685::Error::I2C(_) => ServoError::I2c,
        pwm_pca9685::Error::InvalidInputData => ServoError::InvalidInputData
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
