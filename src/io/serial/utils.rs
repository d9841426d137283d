// src/io/serial/utils.rs
//
// Line settings for the serial transport and their mapping onto the
// serialport crate. Invalid values are rejected rather than silently
// replaced, since a wrong baud/bit setting only shows up as garbage frames.

use serde::{Deserialize, Serialize};

use crate::io::IoError;

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl Default for Parity {
    fn default() -> Self {
        Parity::None
    }
}

impl Parity {
    pub fn from_str(s: &str) -> Result<Self, IoError> {
        match s.to_lowercase().as_str() {
            "none" | "n" => Ok(Parity::None),
            "odd" | "o" => Ok(Parity::Odd),
            "even" | "e" => Ok(Parity::Even),
            _ => Err(IoError::config(format!("unknown parity '{}'", s))),
        }
    }

    /// Letter used in the usual `8N1` notation
    pub fn letter(&self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        }
    }
}

/// Check data/stop bit counts before touching the port
pub fn validate_line_settings(data_bits: u8, stop_bits: u8) -> Result<(), IoError> {
    if !(5..=8).contains(&data_bits) {
        return Err(IoError::config(format!("data_bits must be 5-8, got {}", data_bits)));
    }
    if !(1..=2).contains(&stop_bits) {
        return Err(IoError::config(format!("stop_bits must be 1 or 2, got {}", stop_bits)));
    }
    Ok(())
}

#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub(crate) mod sp {
    use super::Parity;
    use serialport::{DataBits, Parity as SpParity, StopBits};

    pub fn parity(p: Parity) -> SpParity {
        match p {
            Parity::None => SpParity::None,
            Parity::Odd => SpParity::Odd,
            Parity::Even => SpParity::Even,
        }
    }

    /// Caller validates with `validate_line_settings` first
    pub fn data_bits(bits: u8) -> DataBits {
        match bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        }
    }

    pub fn stop_bits(bits: u8) -> StopBits {
        match bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        }
    }
}
