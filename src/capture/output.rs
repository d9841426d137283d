// src/capture/output.rs
//
// Capture output: where the pcap stream goes. Either stdout (for
// `serialcap ... | wireshark -k -i -`) or a path, which may be a regular file
// or a FIFO / named pipe created beforehand by the viewer-side tooling.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::io::IoError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTarget {
    Stdout,
    Path(PathBuf),
}

impl CaptureTarget {
    /// `-` selects stdout, anything else is a path
    pub fn parse(s: &str) -> Self {
        if s == "-" {
            CaptureTarget::Stdout
        } else {
            CaptureTarget::Path(PathBuf::from(s))
        }
    }
}

/// Pipes and FIFOs must be opened for writing as-is, never created or truncated.
fn is_pipe_like(path: &Path) -> bool {
    if path.to_string_lossy().starts_with(r"\\.\pipe\") {
        return true;
    }
    std::fs::metadata(path)
        .map(|m| !m.is_file() && !m.is_dir())
        .unwrap_or(false)
}

pub fn open_capture_output(target: &CaptureTarget) -> Result<Box<dyn Write + Send>, IoError> {
    match target {
        CaptureTarget::Stdout => Ok(Box::new(std::io::stdout())),
        CaptureTarget::Path(path) => {
            let pipe = is_pipe_like(path);
            let mut options = std::fs::OpenOptions::new();
            options.write(true);
            if !pipe {
                options.create(true).truncate(true);
            }

            // Opening a FIFO blocks until the reader side is attached
            if pipe {
                tlog!("[capture] Waiting for a reader on {}", path.display());
            }
            let file = options
                .open(path)
                .map_err(|e| IoError::open(path.display().to_string(), e))?;
            tlog!("[capture] Writing pcap stream to {}", path.display());
            Ok(Box::new(file))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        assert_eq!(CaptureTarget::parse("-"), CaptureTarget::Stdout);
        assert_eq!(
            CaptureTarget::parse("/tmp/out.pcap"),
            CaptureTarget::Path(PathBuf::from("/tmp/out.pcap"))
        );
    }

    #[test]
    fn test_open_regular_file_truncates() {
        let path = std::env::temp_dir().join(format!("serialcap-output-{}.pcap", std::process::id()));
        std::fs::write(&path, b"stale contents").unwrap();

        {
            let mut out = open_capture_output(&CaptureTarget::Path(path.clone())).unwrap();
            out.write_all(&[0x01, 0x02]).unwrap();
        }

        assert_eq!(std::fs::read(&path).unwrap(), vec![0x01, 0x02]);
        let _ = std::fs::remove_file(&path);
    }

    #[cfg(unix)]
    #[test]
    fn test_open_existing_fifo_as_is() {
        use std::io::Read;
        use std::os::unix::fs::FileTypeExt;

        let path = std::env::temp_dir().join(format!("serialcap-fifo-{}", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let status = std::process::Command::new("mkfifo").arg(&path).status().unwrap();
        assert!(status.success());
        assert!(is_pipe_like(&path));

        // Viewer side: the open on either end blocks until the other attaches
        let viewer_path = path.clone();
        let viewer = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            std::fs::File::open(&viewer_path)
                .unwrap()
                .read_to_end(&mut bytes)
                .unwrap();
            bytes
        });

        {
            let mut out = open_capture_output(&CaptureTarget::Path(path.clone())).unwrap();
            out.write_all(&[0xD4, 0xC3, 0xB2, 0xA1]).unwrap();
        }

        assert_eq!(viewer.join().unwrap(), vec![0xD4, 0xC3, 0xB2, 0xA1]);
        assert!(std::fs::metadata(&path).unwrap().file_type().is_fifo());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let target = CaptureTarget::Path(PathBuf::from("/nonexistent-serialcap-dir/out.pcap"));
        assert!(matches!(open_capture_output(&target), Err(IoError::Open { .. })));
    }
}
