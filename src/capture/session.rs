// src/capture/session.rs
//
// Capture session: the pcap flavour of frame sink. Owns the output, the chosen
// link-layer encapsulator and the start epoch used to turn the probe's
// relative tick counter into absolute record timestamps.

use std::io::Write;

use super::link::LinkLayer;
use super::pcap::CaptureEncoder;
use super::FrameSink;
use crate::io::{now_secs, Frame, IoError};

pub struct CaptureSession<W: Write + Send = Box<dyn Write + Send>> {
    /// `None` once closed
    encoder: Option<CaptureEncoder<W>>,
    link: Box<dyn LinkLayer>,
    start_epoch_secs: u32,
}

impl<W: Write + Send> CaptureSession<W> {
    /// Start a session stamped with the current time and write the global header.
    pub fn start(out: W, link: Box<dyn LinkLayer>) -> Result<Self, IoError> {
        Self::with_start_epoch(out, link, now_secs())
    }

    pub fn with_start_epoch(
        out: W,
        link: Box<dyn LinkLayer>,
        start_epoch_secs: u32,
    ) -> Result<Self, IoError> {
        let mut encoder = CaptureEncoder::new(out);
        encoder.write_global_header(link.link_type_id())?;

        tlog!(
            "[capture] Session started (link type {}, epoch {})",
            link.link_type_id(),
            start_epoch_secs
        );

        Ok(CaptureSession {
            encoder: Some(encoder),
            link,
            start_epoch_secs,
        })
    }

    pub fn start_epoch_secs(&self) -> u32 {
        self.start_epoch_secs
    }

    pub fn link_type_id(&self) -> u32 {
        self.link.link_type_id()
    }

    pub fn records(&self) -> u64 {
        self.encoder.as_ref().map(|e| e.records()).unwrap_or(0)
    }
}

impl<W: Write + Send> FrameSink for CaptureSession<W> {
    fn accept(&mut self, frame: Frame) -> Result<(), IoError> {
        let encoder = self.encoder.as_mut().ok_or_else(|| {
            IoError::sink_write(
                "capture",
                std::io::Error::new(std::io::ErrorKind::NotConnected, "session closed"),
            )
        })?;

        let record = self.link.transform(frame.link_payload());
        encoder.write_frame(self.start_epoch_secs, frame.ticks_ms(), &record)
    }

    fn close(&mut self) -> Result<(), IoError> {
        if let Some(mut encoder) = self.encoder.take() {
            let records = encoder.records();
            encoder.flush_or_fail()?;
            tlog!("[capture] Session closed after {} record(s)", records);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::link::{BluetoothHciH4WithPhdr, Ethernet};
    use crate::capture::pcap::{GLOBAL_HEADER_LEN, RECORD_HEADER_LEN};
    use crate::capture::testing::{BrokenPipe, SharedBuffer};

    fn frame(ticks: u32, body: &[u8]) -> Frame {
        let mut bytes = ticks.to_le_bytes().to_vec();
        bytes.extend_from_slice(body);
        Frame::from_body(bytes).unwrap()
    }

    fn u32_at(buf: &[u8], at: usize) -> u32 {
        u32::from_ne_bytes(buf[at..at + 4].try_into().unwrap())
    }

    #[test]
    fn test_session_writes_encapsulated_record() {
        let out = SharedBuffer::default();
        let mut session =
            CaptureSession::with_start_epoch(out.clone(), Box::new(BluetoothHciH4WithPhdr), 1000)
                .unwrap();

        // Outbound HCI command
        session.accept(frame(2250, &[0x00, 0x01, 0x03, 0x0C, 0x00])).unwrap();
        session.close().unwrap();

        let bytes = out.contents();
        assert_eq!(u32_at(&bytes, 20), 201);

        let rec = GLOBAL_HEADER_LEN;
        assert_eq!(u32_at(&bytes, rec), 1002);
        assert_eq!(u32_at(&bytes, rec + 4), 250_000);
        assert_eq!(u32_at(&bytes, rec + 8), 8);
        assert_eq!(u32_at(&bytes, rec + 12), 8);
        assert_eq!(
            &bytes[rec + RECORD_HEADER_LEN..],
            &[0x00, 0x00, 0x00, 0x01, 0x01, 0x03, 0x0C, 0x00]
        );
    }

    #[test]
    fn test_ethernet_session() {
        let out = SharedBuffer::default();
        let mut session =
            CaptureSession::with_start_epoch(out.clone(), Box::new(Ethernet), 0).unwrap();
        session.accept(frame(0, &[0x01, 0xDE, 0xAD])).unwrap();
        assert_eq!(session.records(), 1);

        let bytes = out.contents();
        assert_eq!(u32_at(&bytes, 20), 1);
        assert_eq!(&bytes[GLOBAL_HEADER_LEN + RECORD_HEADER_LEN..], &[0xDE, 0xAD]);
    }

    #[test]
    fn test_accept_after_close_fails() {
        let mut session =
            CaptureSession::with_start_epoch(Vec::new(), Box::new(Ethernet), 0).unwrap();
        session.close().unwrap();
        assert!(session.accept(frame(0, &[0x01, 0x02])).is_err());
        // Closing twice is harmless
        session.close().unwrap();
    }

    #[test]
    fn test_broken_output_fails_start() {
        let err = CaptureSession::start(BrokenPipe, Box::new(Ethernet)).err().unwrap();
        assert!(err.is_broken_pipe());
    }
}
