// src/io/mod.rs
//
// Transport side of the bridge: the serial reader, the deframer and the
// shared frame type handed to the sinks.

mod error;
pub mod serial;

pub use error::{FramingFault, IoError};

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// Shared Types
// ============================================================================

/// Bytes in front of the payload: 4-byte tick counter + 1-byte direction.
pub const FRAME_HEADER_LEN: usize = 5;

/// Frame direction, taken from the direction byte of a recovered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Controller to host (direction byte != 0)
    Inbound,
    /// Host to controller (direction byte == 0)
    Outbound,
}

impl Direction {
    pub fn from_byte(b: u8) -> Self {
        if b != 0 {
            Direction::Inbound
        } else {
            Direction::Outbound
        }
    }

    /// One-letter tag used by the hex log
    pub fn tag(&self) -> char {
        match self {
            Direction::Inbound => 'I',
            Direction::Outbound => 'O',
        }
    }
}

/// A frame recovered from the serial stream, with the 3-byte wire header and
/// the trailer stripped.
///
/// Layout: `| ticks (u32 LE, ms) | direction (u8) | payload ... |`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Wrap a frame body. Returns `None` when the body cannot hold the
    /// tick counter and direction byte.
    pub fn from_body(bytes: Vec<u8>) -> Option<Self> {
        if bytes.len() < FRAME_HEADER_LEN {
            return None;
        }
        Some(Frame { bytes })
    }

    /// Relative time in milliseconds, as stamped by the sender
    pub fn ticks_ms(&self) -> u32 {
        u32::from_le_bytes([self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]])
    }

    pub fn direction_byte(&self) -> u8 {
        self.bytes[4]
    }

    pub fn direction(&self) -> Direction {
        Direction::from_byte(self.direction_byte())
    }

    /// Direction byte followed by the payload; this is what the link-layer
    /// encapsulators consume.
    pub fn link_payload(&self) -> &[u8] {
        &self.bytes[4..]
    }

    /// Application payload only
    pub fn payload(&self) -> &[u8] {
        &self.bytes[FRAME_HEADER_LEN..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Get current time in seconds since UNIX epoch
pub fn now_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
