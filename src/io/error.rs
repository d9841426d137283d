// src/io/error.rs
//
// Error types for the capture pipeline.
//
// `IoError` is surfaced to callers (transport open/read failures, sink write
// failures, bad configuration). `FramingFault` describes stream corruption that
// the deframer recovers from locally; it is logged and counted, never returned.

use std::fmt;

// ============================================================================
// IoError
// ============================================================================

/// Errors surfaced by the transport, the frame sinks and the configuration layer.
#[derive(Debug)]
pub enum IoError {
    /// Failed to open a device or output (serial port, capture file, log file)
    Open { target: String, source: std::io::Error },
    /// Read failure on the transport
    Read { target: String, message: String },
    /// Write or flush failure on a frame sink (log file, capture pipe)
    SinkWrite { sink: &'static str, source: std::io::Error },
    /// Invalid configuration value
    Config(String),
}

impl IoError {
    pub fn open(target: impl Into<String>, source: std::io::Error) -> Self {
        IoError::Open {
            target: target.into(),
            source,
        }
    }

    pub fn read(target: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Read {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn sink_write(sink: &'static str, source: std::io::Error) -> Self {
        IoError::SinkWrite { sink, source }
    }

    pub fn config(message: impl Into<String>) -> Self {
        IoError::Config(message.into())
    }

    /// True when the downstream reader went away (viewer closed the pipe).
    pub fn is_broken_pipe(&self) -> bool {
        matches!(
            self,
            IoError::SinkWrite { source, .. } if source.kind() == std::io::ErrorKind::BrokenPipe
        )
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::Open { target, source } => write!(f, "Failed to open {}: {}", target, source),
            IoError::Read { target, message } => write!(f, "Read error on {}: {}", target, message),
            IoError::SinkWrite { sink, source } => write!(f, "{} sink write failed: {}", sink, source),
            IoError::Config(message) => write!(f, "Invalid configuration: {}", message),
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoError::Open { source, .. } | IoError::SinkWrite { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<IoError> for String {
    fn from(e: IoError) -> Self {
        e.to_string()
    }
}

// ============================================================================
// FramingFault
// ============================================================================

/// Corrupted framing detected by the deframer. Always recovered by resyncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingFault {
    /// Byte at the trailer position was not 0x55
    TrailerMismatch { found: u8 },
    /// Declared length does not fit in the frame buffer
    FrameBufferOverflow { declared: usize },
    /// Declared length is too short to hold the tick counter and direction byte
    BodyTooShort { declared: usize },
}

impl fmt::Display for FramingFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingFault::TrailerMismatch { found } => {
                write!(f, "trailer mismatch (found 0x{:02X}, expected 0x55)", found)
            }
            FramingFault::FrameBufferOverflow { declared } => {
                write!(f, "declared length {} overflows the frame buffer", declared)
            }
            FramingFault::BodyTooShort { declared } => {
                write!(f, "declared length {} is shorter than a frame header", declared)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broken_pipe_detection() {
        let err = IoError::sink_write(
            "capture",
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "viewer closed"),
        );
        assert!(err.is_broken_pipe());

        let err = IoError::sink_write(
            "capture",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert!(!err.is_broken_pipe());
    }

    #[test]
    fn test_error_to_string() {
        let msg: String = IoError::config("idle_timeout_ms must be > 0").into();
        assert_eq!(msg, "Invalid configuration: idle_timeout_ms must be > 0");
    }

    #[test]
    fn test_fault_display() {
        let fault = FramingFault::TrailerMismatch { found: 0x12 };
        assert_eq!(fault.to_string(), "trailer mismatch (found 0x12, expected 0x55)");
    }
}
