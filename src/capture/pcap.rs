// src/capture/pcap.rs
//
// libpcap file/stream encoder.
//
// Headers are written in the producing machine's native byte order. The magic
// number goes out in the same order, so readers detect the layout from it.
//
// Format reference: https://wiki.wireshark.org/Development/LibpcapFileFormat

use std::io::Write;

use crate::io::IoError;

// =============================================================================
// Constants
// =============================================================================

/// Microsecond-resolution magic
pub const PCAP_MAGIC: u32 = 0xA1B2_C3D4;
pub const PCAP_VERSION_MAJOR: u16 = 2;
pub const PCAP_VERSION_MINOR: u16 = 4;
pub const PCAP_SNAPLEN: u32 = 65535;

pub const GLOBAL_HEADER_LEN: usize = 24;
pub const RECORD_HEADER_LEN: usize = 16;

// =============================================================================
// Encoder
// =============================================================================

/// Writes a global header followed by one record per frame. Every write is
/// flushed straight away since a viewer may be reading the other end of a pipe.
pub struct CaptureEncoder<W: Write> {
    out: W,
    records: u64,
}

impl<W: Write> CaptureEncoder<W> {
    pub fn new(out: W) -> Self {
        CaptureEncoder { out, records: 0 }
    }

    /// Number of records written so far
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn write_global_header(&mut self, link_type: u32) -> Result<(), IoError> {
        let mut header = Vec::with_capacity(GLOBAL_HEADER_LEN);
        header.extend_from_slice(&PCAP_MAGIC.to_ne_bytes());
        header.extend_from_slice(&PCAP_VERSION_MAJOR.to_ne_bytes());
        header.extend_from_slice(&PCAP_VERSION_MINOR.to_ne_bytes());
        // GMT offset: timestamps are UTC
        header.extend_from_slice(&0i32.to_ne_bytes());
        // Timestamp accuracy. All tools set zero.
        header.extend_from_slice(&0u32.to_ne_bytes());
        header.extend_from_slice(&PCAP_SNAPLEN.to_ne_bytes());
        header.extend_from_slice(&link_type.to_ne_bytes());

        self.write_flushed(&header)
    }

    /// Write one record. The timestamp is `start_epoch_secs` plus the frame's
    /// relative tick count. Payloads are never truncated.
    pub fn write_frame(
        &mut self,
        start_epoch_secs: u32,
        relative_ticks_ms: u32,
        payload: &[u8],
    ) -> Result<(), IoError> {
        let seconds = start_epoch_secs.wrapping_add(relative_ticks_ms / 1000);
        let micros = (relative_ticks_ms % 1000) * 1000;
        let len = payload.len() as u32;

        let mut record = Vec::with_capacity(RECORD_HEADER_LEN + payload.len());
        record.extend_from_slice(&seconds.to_ne_bytes());
        record.extend_from_slice(&micros.to_ne_bytes());
        record.extend_from_slice(&len.to_ne_bytes()); // captured
        record.extend_from_slice(&len.to_ne_bytes()); // original
        record.extend_from_slice(payload);

        self.write_flushed(&record)?;
        self.records += 1;
        Ok(())
    }

    pub fn flush_or_fail(&mut self) -> Result<(), IoError> {
        self.out
            .flush()
            .map_err(|e| IoError::sink_write("capture", e))
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_flushed(&mut self, bytes: &[u8]) -> Result<(), IoError> {
        self.out
            .write_all(bytes)
            .map_err(|e| IoError::sink_write("capture", e))?;
        self.flush_or_fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::BrokenPipe;

    fn u32_at(buf: &[u8], at: usize) -> u32 {
        u32::from_ne_bytes(buf[at..at + 4].try_into().unwrap())
    }

    fn u16_at(buf: &[u8], at: usize) -> u16 {
        u16::from_ne_bytes(buf[at..at + 2].try_into().unwrap())
    }

    #[test]
    fn test_header_and_record_layout() {
        let mut encoder = CaptureEncoder::new(Vec::new());
        encoder.write_global_header(201).unwrap();
        encoder.write_frame(1000, 1500, &[0xAB]).unwrap();
        let out = encoder.into_inner();

        assert_eq!(out.len(), GLOBAL_HEADER_LEN + RECORD_HEADER_LEN + 1);

        // Global header
        assert_eq!(u32_at(&out, 0), 0xA1B2C3D4);
        assert_eq!(u16_at(&out, 4), 2);
        assert_eq!(u16_at(&out, 6), 4);
        assert_eq!(u32_at(&out, 8), 0);
        assert_eq!(u32_at(&out, 12), 0);
        assert_eq!(u32_at(&out, 16), 65535);
        assert_eq!(u32_at(&out, 20), 201);

        // Record header
        assert_eq!(u32_at(&out, 24), 1001);
        assert_eq!(u32_at(&out, 28), 500_000);
        assert_eq!(u32_at(&out, 32), 1);
        assert_eq!(u32_at(&out, 36), 1);
        assert_eq!(out[40], 0xAB);
    }

    #[test]
    fn test_native_byte_order() {
        let mut encoder = CaptureEncoder::new(Vec::new());
        encoder.write_global_header(1).unwrap();
        let out = encoder.into_inner();
        assert_eq!(&out[0..4], &0xA1B2C3D4u32.to_ne_bytes());
    }

    #[test]
    fn test_timestamp_split() {
        let mut encoder = CaptureEncoder::new(Vec::new());
        encoder.write_frame(0, 86_400_999, &[]).unwrap();
        let out = encoder.into_inner();
        assert_eq!(u32_at(&out, 0), 86_400);
        assert_eq!(u32_at(&out, 4), 999_000);
        assert_eq!(u32_at(&out, 8), 0);
    }

    #[test]
    fn test_record_count() {
        let mut encoder = CaptureEncoder::new(Vec::new());
        encoder.write_global_header(1).unwrap();
        encoder.write_frame(0, 0, &[0x01, 0x02]).unwrap();
        encoder.write_frame(0, 1, &[0x03]).unwrap();
        assert_eq!(encoder.records(), 2);
        assert_eq!(encoder.into_inner().len(), GLOBAL_HEADER_LEN + 2 * RECORD_HEADER_LEN + 3);
    }

    #[test]
    fn test_write_failure_is_surfaced() {
        let mut encoder = CaptureEncoder::new(BrokenPipe);
        let err = encoder.write_global_header(1).unwrap_err();
        assert!(err.is_broken_pipe());
        assert!(encoder.write_frame(0, 0, &[0x01]).is_err());
        assert_eq!(encoder.records(), 0);
    }
}
