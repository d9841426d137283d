// src/capture/hexlog.rs
//
// Plain-text frame log. One block per frame:
//
//   I 00:00:01.500000
//   0000 04 0e 04 01 03 0c 00
//
// Direction tag, relative timestamp from the frame's tick counter, then the
// payload 16 bytes per row with a running hex offset, then a blank line.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::FrameSink;
use crate::io::{Frame, IoError};

const BYTES_PER_ROW: usize = 16;

/// Format a millisecond tick count as `HH:MM:SS.ffffff`, prefixed with
/// `Nd ` once the count passes a day.
pub fn format_ticks(ticks_ms: u32) -> String {
    let millis = ticks_ms % 1000;
    let total_secs = ticks_ms / 1000;
    let days = total_secs / 86_400;
    let hours = (total_secs / 3600) % 24;
    let minutes = (total_secs / 60) % 60;
    let seconds = total_secs % 60;

    let clock = format!("{:02}:{:02}:{:02}.{:06}", hours, minutes, seconds, millis * 1000);
    if days > 0 {
        format!("{}d {}", days, clock)
    } else {
        clock
    }
}

/// Render one frame as a text block (including the trailing blank line)
pub fn format_frame(frame: &Frame) -> String {
    let mut block = format!("{} {}\n", frame.direction().tag(), format_ticks(frame.ticks_ms()));

    for (row_idx, row) in frame.payload().chunks(BYTES_PER_ROW).enumerate() {
        let encoded = hex::encode(row);
        let pairs: Vec<&str> = (0..row.len()).map(|i| &encoded[i * 2..i * 2 + 2]).collect();
        block.push_str(&format!("{:04x} {}\n", row_idx * BYTES_PER_ROW, pairs.join(" ")));
    }

    block.push('\n');
    block
}

/// Hex dump sink. Appends to an open text output until `close()`.
pub struct HexLogSink<W: Write + Send = File> {
    out: Option<W>,
}

impl<W: Write + Send> HexLogSink<W> {
    pub fn new(out: W) -> Self {
        HexLogSink { out: Some(out) }
    }
}

impl HexLogSink<File> {
    /// Open a session-named log file (`YYYYmmdd-HHMMSS-serialcap.txt`) in `dir`.
    pub fn create_in(dir: &Path) -> Result<(Self, PathBuf), IoError> {
        std::fs::create_dir_all(dir).map_err(|e| IoError::open(dir.display().to_string(), e))?;

        let filename = chrono::Local::now()
            .format("%Y%m%d-%H%M%S-serialcap.txt")
            .to_string();
        let path = dir.join(filename);

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| IoError::open(path.display().to_string(), e))?;

        tlog!("[hexlog] Writing frames to {}", path.display());
        Ok((HexLogSink::new(file), path))
    }
}

impl<W: Write + Send> FrameSink for HexLogSink<W> {
    fn accept(&mut self, frame: Frame) -> Result<(), IoError> {
        let out = self.out.as_mut().ok_or_else(|| {
            IoError::sink_write(
                "log",
                std::io::Error::new(std::io::ErrorKind::NotConnected, "log closed"),
            )
        })?;

        out.write_all(format_frame(&frame).as_bytes())
            .and_then(|_| out.flush())
            .map_err(|e| IoError::sink_write("log", e))
    }

    fn close(&mut self) -> Result<(), IoError> {
        if let Some(mut out) = self.out.take() {
            out.flush().map_err(|e| IoError::sink_write("log", e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::{BrokenPipe, SharedBuffer};

    fn frame(ticks: u32, direction: u8, payload: &[u8]) -> Frame {
        let mut bytes = ticks.to_le_bytes().to_vec();
        bytes.push(direction);
        bytes.extend_from_slice(payload);
        Frame::from_body(bytes).unwrap()
    }

    #[test]
    fn test_format_ticks() {
        assert_eq!(format_ticks(0), "00:00:00.000000");
        assert_eq!(format_ticks(1500), "00:00:01.500000");
        assert_eq!(format_ticks(3_723_004), "01:02:03.004000");
        assert_eq!(format_ticks(90_061_001), "1d 01:01:01.001000");
    }

    #[test]
    fn test_format_frame_rows() {
        let payload: Vec<u8> = (0u8..20).collect();
        let text = format_frame(&frame(1500, 1, &payload));

        let expected = "I 00:00:01.500000\n\
                        0000 00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f\n\
                        0010 10 11 12 13\n\
                        \n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_format_frame_empty_payload() {
        assert_eq!(format_frame(&frame(0, 0, &[])), "O 00:00:00.000000\n\n");
    }

    #[test]
    fn test_sink_appends_blocks() {
        let out = SharedBuffer::default();
        let mut sink = HexLogSink::new(out.clone());
        sink.accept(frame(1, 0, &[0xAB])).unwrap();
        sink.accept(frame(2, 1, &[0xCD])).unwrap();
        sink.close().unwrap();

        let text = String::from_utf8(out.contents()).unwrap();
        assert_eq!(text, "O 00:00:00.001000\n0000 ab\n\nI 00:00:00.002000\n0000 cd\n\n");
        assert!(sink.accept(frame(3, 1, &[])).is_err());
    }

    #[test]
    fn test_sink_write_failure() {
        let mut sink = HexLogSink::new(BrokenPipe);
        let err = sink.accept(frame(1, 0, &[0x01])).unwrap_err();
        assert!(err.is_broken_pipe());
    }

    #[test]
    fn test_create_in_names_file_by_session() {
        let dir = std::env::temp_dir().join(format!("serialcap-hexlog-{}", std::process::id()));
        let (mut sink, path) = HexLogSink::create_in(&dir).unwrap();
        sink.accept(frame(0, 1, &[0x01])).unwrap();
        sink.close().unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("-serialcap.txt"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("I 00:00:00.000000\n0000 01\n"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
