// src/capture/mod.rs
//
// Frame sinks: consumers of recovered frames.
//
// - hexlog.rs  - plain-text hex dump with relative timestamps
// - session.rs - pcap capture session (link-layer encapsulation + encoder)
// - link.rs    - link-layer encapsulators, one per pcap link type
// - pcap.rs    - libpcap global/record header encoder
// - output.rs  - opening the capture output (file, FIFO, stdout)

pub mod hexlog;
pub mod link;
pub mod output;
pub mod pcap;
pub mod session;

pub use hexlog::HexLogSink;
pub use link::{LinkLayer, LinkType};
pub use output::{open_capture_output, CaptureTarget};
pub use pcap::CaptureEncoder;
pub use session::CaptureSession;

use serde::{Deserialize, Serialize};

use crate::io::{Frame, IoError};

// ============================================================================
// Frame Sink Trait
// ============================================================================

/// Consumer of recovered frames.
///
/// Sinks are called synchronously from the deframer, under its lock, in the
/// order the frames were recognised on the wire.
pub trait FrameSink: Send {
    /// Consume one frame. The frame is owned; nothing points back into the
    /// deframer's buffer.
    fn accept(&mut self, frame: Frame) -> Result<(), IoError>;

    /// Flush and release the underlying output.
    fn close(&mut self) -> Result<(), IoError>;
}

/// Output mode selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Hex dump text log
    Log,
    /// pcap stream for a packet analyzer
    Capture,
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::Capture
    }
}

impl OutputMode {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "log" | "hex" => Ok(OutputMode::Log),
            "capture" | "pcap" => Ok(OutputMode::Capture),
            _ => Err(format!("Unknown output mode: {}", s)),
        }
    }
}

// ============================================================================
// Test helpers
// ============================================================================
