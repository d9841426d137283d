// src/io/serial/reader.rs
//
// Transport side: opens the serial port and pumps raw chunks into the
// deframer. `pump` works on any `Read`, so captures can also be replayed from
// a file.

use serde::Serialize;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};

use super::framer::Deframer;
use super::utils::Parity;
use crate::io::IoError;

// ============================================================================
// Types and Configuration
// ============================================================================

/// Serial port configuration
#[derive(Clone, Debug)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
}

/// What to do when the frame sink fails (e.g. the viewer closed its pipe)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SinkErrorPolicy {
    /// End the stream with the sink error
    #[default]
    Stop,
    /// Log and keep recovering frames
    Continue,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PumpOptions {
    pub sink_errors: SinkErrorPolicy,
    /// Maximum number of bytes to read before stopping (None = no limit)
    pub byte_limit: Option<u64>,
}

/// Why the stream ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamEnd {
    /// Stop flag raised
    Stopped,
    /// Transport reported EOF
    Disconnected,
    /// Byte limit reached
    Complete,
}

/// Information about an available serial port
#[derive(Clone, Debug, Serialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

// ============================================================================
// Pump
// ============================================================================

const READ_CHUNK: usize = 4096;

/// Read chunks from `source` and feed them to `deframer` until EOF, the stop
/// flag, the byte limit, a read error, or (with `SinkErrorPolicy::Stop`) a
/// sink failure.
pub fn pump<R: Read + ?Sized>(
    source: &mut R,
    label: &str,
    deframer: &Deframer,
    stop: &AtomicBool,
    options: PumpOptions,
) -> Result<StreamEnd, IoError> {
    let mut buf = [0u8; READ_CHUNK];
    let mut total_bytes_read: u64 = 0;

    loop {
        if stop.load(Ordering::Relaxed) {
            return Ok(StreamEnd::Stopped);
        }

        if let Some(limit) = options.byte_limit {
            if total_bytes_read >= limit {
                tlog!("[serial:{}] Reached limit of {} bytes, stopping", label, limit);
                return Ok(StreamEnd::Complete);
            }
        }

        // Never read past the limit
        let want = match options.byte_limit {
            Some(limit) => READ_CHUNK.min((limit - total_bytes_read) as usize),
            None => READ_CHUNK,
        };

        match source.read(&mut buf[..want]) {
            Ok(0) => return Ok(StreamEnd::Disconnected),
            Ok(n) => {
                total_bytes_read += n as u64;
                if let Err(e) = deframer.feed(&buf[..n]) {
                    match options.sink_errors {
                        SinkErrorPolicy::Stop => return Err(e),
                        SinkErrorPolicy::Continue => {
                            tlog!("[serial:{}] Sink error ignored: {}", label, e);
                        }
                    }
                }
            }
            // Serial reads time out when the line is quiet
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(IoError::read(label, e.to_string())),
        }
    }
}

// ============================================================================
// Serial Port
// ============================================================================

#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub use port::{list_ports, open_port};

#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
mod port {
    use super::{SerialConfig, SerialPortInfo};
    use crate::io::serial::utils::{sp, validate_line_settings};
    use crate::io::IoError;
    use std::time::Duration;

    /// Open the port with a short timeout so the pump notices the stop flag quickly.
    pub fn open_port(config: &SerialConfig) -> Result<Box<dyn serialport::SerialPort>, IoError> {
        validate_line_settings(config.data_bits, config.stop_bits)?;

        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(sp::data_bits(config.data_bits))
            .stop_bits(sp::stop_bits(config.stop_bits))
            .parity(sp::parity(config.parity))
            .timeout(Duration::from_millis(1))
            .open()
            .map_err(|e| IoError::open(config.port.clone(), e.into()))?;

        tlog!(
            "[serial:{}] Opened at {} baud ({}-{}-{})",
            config.port,
            config.baud_rate,
            config.data_bits,
            config.parity.letter(),
            config.stop_bits
        );
        Ok(port)
    }

    /// List available serial ports.
    ///
    /// On macOS only /dev/cu.* devices are listed; the tty variants block on
    /// open waiting for carrier detect.
    pub fn list_ports() -> Result<Vec<SerialPortInfo>, IoError> {
        let ports = serialport::available_ports()
            .map_err(|e| IoError::read("port enumeration", e.to_string()))?;

        Ok(ports
            .into_iter()
            .filter(|_p| {
                #[cfg(target_os = "macos")]
                {
                    !_p.port_name.starts_with("/dev/tty.")
                }
                #[cfg(not(target_os = "macos"))]
                {
                    true
                }
            })
            .map(|p| {
                let (port_type, manufacturer, product, serial_number) = match p.port_type {
                    serialport::SerialPortType::UsbPort(info) => (
                        format!("USB {:04x}:{:04x}", info.vid, info.pid),
                        info.manufacturer,
                        info.product,
                        info.serial_number,
                    ),
                    serialport::SerialPortType::BluetoothPort => {
                        ("Bluetooth".to_string(), None, None, None)
                    }
                    serialport::SerialPortType::PciPort => ("PCI".to_string(), None, None, None),
                    serialport::SerialPortType::Unknown => {
                        ("Unknown".to_string(), None, None, None)
                    }
                };
                SerialPortInfo {
                    port_name: p.port_name,
                    port_type,
                    manufacturer,
                    product,
                    serial_number,
                }
            })
            .collect())
    }
}
