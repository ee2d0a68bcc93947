//! # Drive command
//!
//! A drive command is sent by the operator station to the vehicle once per input sample. On the
//! wire it is a UTF-8 string of exactly four whitespace separated decimal integers:
//!
//! ```text
//! steering throttle brake gear
//! ```
//!
//! `steering`, `throttle` and `brake` are already normalised by the operator station (nominally
//! `0..=1999`), `gear` is one of `-1` (request reverse), `0` (no change) or `1` (request drive).
//! One datagram carries one command.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{convert::TryFrom, fmt, num::ParseIntError, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of tokens in a command.
pub const NUM_CMD_TOKENS: usize = 4;

/// Lowest nominal value of an axis produced by the operator station.
pub const AXIS_MIN: i32 = 0;

/// Highest nominal value of an axis produced by the operator station.
pub const AXIS_MAX: i32 = 1999;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single drive command from the operator.
///
/// Commands are immutable once parsed, a malformed payload never produces a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveCmd {
    steering: i32,
    throttle: i32,
    brake: i32,
    gear: Gear,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Gear shift request carried by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gear {
    /// Shift into reverse (`-1` on the wire)
    Reverse,

    /// Keep the current gear (`0` on the wire)
    Hold,

    /// Shift into drive (`1` on the wire)
    Drive,
}

/// Errors which can occur while parsing a command.
#[derive(Debug, Error, PartialEq)]
pub enum CmdParseError {
    #[error("Command payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("Expected 4 tokens in command, found {0}")]
    WrongTokenCount(usize),

    #[error("Token {index} ({token:?}) is not an integer: {source}")]
    InvalidToken {
        index: usize,
        token: String,
        source: ParseIntError,
    },

    #[error("Gear must be -1, 0 or 1, found {0}")]
    InvalidGear(i32),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DriveCmd {
    /// Create a new command from its fields.
    pub fn new(steering: i32, throttle: i32, brake: i32, gear: Gear) -> Self {
        Self {
            steering,
            throttle,
            brake,
            gear,
        }
    }

    /// A command with centred steering, no throttle, no brake, and no gear change.
    pub fn neutral() -> Self {
        Self::new((AXIS_MIN + AXIS_MAX) / 2, AXIS_MIN, AXIS_MIN, Gear::Hold)
    }

    /// Parse a command from a raw datagram payload.
    ///
    /// Trailing NUL bytes (left by fixed size C buffers on the operator side) are ignored.
    pub fn from_bytes(payload: &[u8]) -> Result<Self, CmdParseError> {
        let end = payload
            .iter()
            .rposition(|b| *b != 0)
            .map(|i| i + 1)
            .unwrap_or(0);

        std::str::from_utf8(&payload[..end])
            .map_err(|_| CmdParseError::InvalidUtf8)?
            .parse()
    }

    pub fn steering(&self) -> i32 {
        self.steering
    }

    pub fn throttle(&self) -> i32 {
        self.throttle
    }

    pub fn brake(&self) -> i32 {
        self.brake
    }

    pub fn gear(&self) -> Gear {
        self.gear
    }
}

impl FromStr for DriveCmd {
    type Err = CmdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split_ascii_whitespace().collect();

        if tokens.len() != NUM_CMD_TOKENS {
            return Err(CmdParseError::WrongTokenCount(tokens.len()));
        }

        // Parse all tokens before building anything so no partial command can escape
        let mut values = [0i32; NUM_CMD_TOKENS];
        for (index, token) in tokens.iter().enumerate() {
            values[index] = token
                .parse()
                .map_err(|source| CmdParseError::InvalidToken {
                    index,
                    token: token.to_string(),
                    source,
                })?;
        }

        Ok(Self {
            steering: values[0],
            throttle: values[1],
            brake: values[2],
            gear: Gear::try_from(values[3])?,
        })
    }
}

impl fmt::Display for DriveCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.steering,
            self.throttle,
            self.brake,
            i32::from(self.gear)
        )
    }
}

impl TryFrom<i32> for Gear {
    type Error = CmdParseError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Gear::Reverse),
            0 => Ok(Gear::Hold),
            1 => Ok(Gear::Drive),
            v => Err(CmdParseError::InvalidGear(v)),
        }
    }
}

impl From<Gear> for i32 {
    fn from(gear: Gear) -> Self {
        match gear {
            Gear::Reverse => -1,
            Gear::Hold => 0,
            Gear::Drive => 1,
        }
    }
}

impl Default for Gear {
    fn default() -> Self {
        Gear::Hold
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert_eq!(
            "999 1999 0 1".parse::<DriveCmd>(),
            Ok(DriveCmd::new(999, 1999, 0, Gear::Drive))
        );
        assert_eq!(
            "999 0 0 -1".parse::<DriveCmd>(),
            Ok(DriveCmd::new(999, 0, 0, Gear::Reverse))
        );

        // Whitespace is flexible, negatives are allowed (the mapper clamps them)
        assert_eq!(
            "  12\t-5  7 0\n".parse::<DriveCmd>(),
            Ok(DriveCmd::new(12, -5, 7, Gear::Hold))
        );
    }

    #[test]
    fn test_parse_token_count() {
        assert_eq!("".parse::<DriveCmd>(), Err(CmdParseError::WrongTokenCount(0)));
        assert_eq!("1 2 3".parse::<DriveCmd>(), Err(CmdParseError::WrongTokenCount(3)));
        assert_eq!("1 2 3 0 5".parse::<DriveCmd>(), Err(CmdParseError::WrongTokenCount(5)));
    }

    #[test]
    fn test_parse_invalid_tokens() {
        match "1 x 3 0".parse::<DriveCmd>() {
            Err(CmdParseError::InvalidToken { index, token, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(token, "x");
            }
            r => panic!("Expected InvalidToken, got {:?}", r),
        }

        assert!(matches!(
            "1 2 3.5 0".parse::<DriveCmd>(),
            Err(CmdParseError::InvalidToken { index: 2, .. })
        ));
        assert!(matches!(
            "1 2 3 99999999999".parse::<DriveCmd>(),
            Err(CmdParseError::InvalidToken { index: 3, .. })
        ));
        assert_eq!("1 2 3 2".parse::<DriveCmd>(), Err(CmdParseError::InvalidGear(2)));
    }

    #[test]
    fn test_from_bytes() {
        // C clients send from a zeroed fixed size buffer
        let mut buf = [0u8; 32];
        let msg = b"1000 500 0 0";
        buf[..msg.len()].copy_from_slice(msg);

        assert_eq!(
            DriveCmd::from_bytes(&buf),
            Ok(DriveCmd::new(1000, 500, 0, Gear::Hold))
        );
        assert_eq!(DriveCmd::from_bytes(&[0xff, 0xfe, 0x20]), Err(CmdParseError::InvalidUtf8));
        assert_eq!(DriveCmd::from_bytes(&[0u8; 8]), Err(CmdParseError::WrongTokenCount(0)));
    }

    #[test]
    fn test_wire_format() {
        let cmd = DriveCmd::new(999, 0, 1999, Gear::Reverse);
        assert_eq!(cmd.to_string(), "999 0 1999 -1");
        assert_eq!(DriveCmd::neutral().to_string(), "999 0 0 0");
    }
}
