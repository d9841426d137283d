#[macro_use]
pub mod logging;
pub mod capture;
pub mod io;
pub mod settings;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;

use capture::{open_capture_output, CaptureSession, FrameSink, HexLogSink, OutputMode};
use io::serial::{pump, Deframer, DeframerStats, StreamEnd};
use io::IoError;
use settings::BridgeSettings;

// ============================================================================
// Byte Sources
// ============================================================================

/// Where raw bytes come from
#[derive(Debug, Clone)]
pub enum ByteSource {
    /// Live serial port named in the settings
    Serial,
    /// Raw byte dump recorded earlier from the same probe
    Replay(PathBuf),
}

/// Build the frame sink selected in the settings.
pub fn build_sink(settings: &BridgeSettings) -> Result<Box<dyn FrameSink>, IoError> {
    match settings.mode {
        OutputMode::Log => {
            let (sink, _path) = HexLogSink::create_in(&settings.log_dir())?;
            Ok(Box::new(sink))
        }
        OutputMode::Capture => {
            let out = open_capture_output(&settings.capture_target())?;
            let session = CaptureSession::start(out, settings.link_type.encapsulator())?;
            Ok(Box::new(session))
        }
    }
}

// ============================================================================
// Run
// ============================================================================

/// Run the bridge until the source ends, Ctrl-C, or an unrecoverable error.
pub async fn run(settings: BridgeSettings, source: ByteSource) -> Result<DeframerStats, String> {
    settings.validate()?;
    let file_logging = settings.file_logging;
    if file_logging {
        logging::init_file_logging(&settings.log_dir())?;
    }

    let result = run_bridge(settings, source).await;
    if file_logging {
        logging::stop_file_logging();
    }
    result
}

async fn run_bridge(settings: BridgeSettings, source: ByteSource) -> Result<DeframerStats, String> {
    // Opening a FIFO blocks until a viewer attaches. Ctrl-C keeps its default
    // behaviour until both ends are open.
    let open_settings = settings.clone();
    let (reader, label, sink) =
        tokio::task::spawn_blocking(move || open_endpoints(&open_settings, &source))
            .await
            .map_err(|e| format!("Open task panicked: {:?}", e))??;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_on_signal = stop.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if request_stop(&stop_on_signal) {
                // The reader may be stuck writing to a viewer that stopped reading
                tlog!("[serialcap] Interrupted again, exiting");
                std::process::exit(130);
            }
            tlog!("[serialcap] Interrupted, stopping (Ctrl-C again to exit now)");
        }
    });

    // Serial reads and pipe writes block, keep them off the async workers
    let runtime = Handle::current();
    tokio::task::spawn_blocking(move || run_capture(reader, &label, sink, &settings, runtime, &stop))
        .await
        .map_err(|e| format!("Capture task panicked: {:?}", e))?
}

/// Raise the stop flag. Returns true when it was already raised.
fn request_stop(stop: &AtomicBool) -> bool {
    stop.swap(true, Ordering::Relaxed)
}

type Endpoints = (Box<dyn std::io::Read + Send>, String, Box<dyn FrameSink>);

fn open_endpoints(settings: &BridgeSettings, source: &ByteSource) -> Result<Endpoints, IoError> {
    let (reader, label) = open_source(settings, source)?;
    let sink = build_sink(settings)?;
    Ok((reader, label, sink))
}

fn run_capture(
    mut reader: Box<dyn std::io::Read + Send>,
    label: &str,
    sink: Box<dyn FrameSink>,
    settings: &BridgeSettings,
    runtime: Handle,
    stop: &AtomicBool,
) -> Result<DeframerStats, String> {
    let deframer = Deframer::new(sink, settings.idle_timeout(), runtime);

    let end = pump(reader.as_mut(), label, &deframer, stop, settings.pump_options());
    let finished = deframer.finish();

    match &end {
        Ok(reason) => tlog!("[serialcap] Stream from {} ended: {:?}", label, reason),
        Err(e) => tlog!("[serialcap] Stream from {} failed: {}", label, e),
    }

    let stats = finished?;
    match serde_json::to_string(&stats) {
        Ok(json) => tlog!("[serialcap] Stats: {}", json),
        Err(e) => tlog!("[serialcap] Failed to serialise stats: {}", e),
    }

    end.map(|_: StreamEnd| stats).map_err(String::from)
}

fn open_source(
    settings: &BridgeSettings,
    source: &ByteSource,
) -> Result<(Box<dyn std::io::Read + Send>, String), IoError> {
    match source {
        ByteSource::Replay(path) => {
            let file = std::fs::File::open(path)
                .map_err(|e| IoError::open(path.display().to_string(), e))?;
            tlog!("[serialcap] Replaying {}", path.display());
            Ok((Box::new(file), path.display().to_string()))
        }
        ByteSource::Serial => {
            let config = settings.serial_config()?;
            open_serial(&config).map(|port| (port, config.port.clone()))
        }
    }
}

#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
fn open_serial(config: &io::serial::SerialConfig) -> Result<Box<dyn std::io::Read + Send>, IoError> {
    let port = io::serial::open_port(config)?;
    Ok(Box::new(port))
}

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
fn open_serial(config: &io::serial::SerialConfig) -> Result<Box<dyn std::io::Read + Send>, IoError> {
    Err(IoError::open(
        config.port.clone(),
        std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "serial ports are not available on this platform",
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::serial::framer::{SYNC_BYTE, TRAILER_BYTE};

    #[tokio::test(flavor = "multi_thread")]
    async fn test_replay_to_capture_file() {
        let tag = std::process::id();
        let replay = std::env::temp_dir().join(format!("serialcap-replay-{}.bin", tag));
        let output = std::env::temp_dir().join(format!("serialcap-replay-{}.pcap", tag));

        let mut raw = vec![0x00, 0x13];
        raw.extend([SYNC_BYTE, 0x08, 0x00, 0xE8, 0x03, 0x00, 0x00, 0x00, 0x01, 0x03, 0x0C]);
        raw.push(TRAILER_BYTE);
        std::fs::write(&replay, &raw).unwrap();

        let settings = BridgeSettings {
            capture_output: output.to_string_lossy().to_string(),
            ..Default::default()
        };
        let stats = run(settings, ByteSource::Replay(replay.clone())).await.unwrap();
        assert_eq!(stats.frames, 1);

        let pcap = std::fs::read(&output).unwrap();
        // 24-byte global header + 16-byte record + 4-byte phdr + 3-byte HCI command
        assert_eq!(pcap.len(), 24 + 16 + 7);
        assert_eq!(&pcap[40..], &[0x00, 0x00, 0x00, 0x01, 0x01, 0x03, 0x0C]);

        let _ = std::fs::remove_file(&replay);
        let _ = std::fs::remove_file(&output);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_replay_file_fails_before_capture() {
        let output = std::env::temp_dir().join(format!("serialcap-unopened-{}.pcap", std::process::id()));
        let settings = BridgeSettings {
            capture_output: output.to_string_lossy().to_string(),
            ..Default::default()
        };

        let err = run(settings, ByteSource::Replay(PathBuf::from("/nonexistent/serialcap.bin")))
            .await
            .unwrap_err();
        assert!(err.contains("Failed to open"));
        assert!(!output.exists());
    }

    #[test]
    fn test_second_interrupt_requests_exit() {
        let stop = AtomicBool::new(false);
        assert!(!request_stop(&stop));
        assert!(stop.load(Ordering::Relaxed));
        assert!(request_stop(&stop));
    }

    #[test]
    fn test_build_log_sink() {
        let dir = std::env::temp_dir().join(format!("serialcap-lib-{}", std::process::id()));
        let settings = BridgeSettings {
            mode: OutputMode::Log,
            log_dir: dir.to_string_lossy().to_string(),
            ..Default::default()
        };
        let mut sink = build_sink(&settings).unwrap();
        sink.close().unwrap();
        assert!(std::fs::read_dir(&dir).unwrap().count() >= 1);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
