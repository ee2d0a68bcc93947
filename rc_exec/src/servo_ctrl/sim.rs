//! Simulated servo driver, used on hosts without servo hardware and in tests.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::HashMap;

use log::trace;

use super::{ActChannel, ServoDriver, ServoError, PWM_PERIOD_US};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Servo driver which records every demanded pulse instead of driving hardware.
#[derive(Debug, Default)]
pub struct SimDriver {
    pulses: HashMap<ActChannel, u16>,
    history: Vec<(ActChannel, u16)>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last pulse width written to the channel, if any.
    pub fn pulse(&self, channel: ActChannel) -> Option<u16> {
        self.pulses.get(&channel).copied()
    }

    /// Every write made to the driver, in order.
    pub fn history(&self) -> &[(ActChannel, u16)] {
        &self.history
    }
}

impl ServoDriver for SimDriver {
    fn set_pulse_width(&mut self, channel: ActChannel, pulse_us: u16) -> Result<(), ServoError> {
        if pulse_us as u32 > PWM_PERIOD_US {
            return Err(ServoError::InvalidPulseWidth(pulse_us))
        }

        trace!("Sim servo {:?} -> {} us", channel, pulse_us);

        self.pulses.insert(channel, pulse_us);
        self.history.push((channel, pulse_us));

        Ok(())
    }
}
