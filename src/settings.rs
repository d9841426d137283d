// src/settings.rs
//
// Bridge settings, read from a TOML file. Every field has a default, so an
// empty or missing file is valid; the CLI overrides individual fields.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::{CaptureTarget, LinkType, OutputMode};
use crate::io::serial::utils::validate_line_settings;
use crate::io::serial::{Parity, PumpOptions, SerialConfig, SinkErrorPolicy};
use crate::io::IoError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BridgeSettings {
    /// Serial device, e.g. "/dev/ttyUSB0" or "COM3"
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,

    #[serde(default)]
    pub mode: OutputMode,
    #[serde(default)]
    pub link_type: LinkType,
    /// Capture destination: "-" for stdout, or a file/FIFO path
    #[serde(default = "default_capture_output")]
    pub capture_output: String,
    /// Directory for hex logs (log mode) and diagnostic logs
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Quiet period before a stalled partial frame is retired
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// End the capture when the output fails (viewer closed)
    #[serde(default = "default_stop_on_sink_error")]
    pub stop_on_sink_error: bool,
    /// Stop after this many bytes (None = run until stopped)
    #[serde(default)]
    pub byte_limit: Option<u64>,
    /// Mirror diagnostics into a timestamped file in `log_dir`
    #[serde(default)]
    pub file_logging: bool,
}

fn default_baud_rate() -> u32 {
    115_200
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_capture_output() -> String {
    "-".to_string()
}
fn default_log_dir() -> String {
    dirs::document_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("serialcap")
        .to_string_lossy()
        .to_string()
}
fn default_idle_timeout_ms() -> u64 {
    10
}
fn default_stop_on_sink_error() -> bool {
    true
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::default(),
            mode: OutputMode::default(),
            link_type: LinkType::default(),
            capture_output: default_capture_output(),
            log_dir: default_log_dir(),
            idle_timeout_ms: default_idle_timeout_ms(),
            stop_on_sink_error: default_stop_on_sink_error(),
            byte_limit: None,
            file_logging: false,
        }
    }
}

impl BridgeSettings {
    pub fn from_toml(text: &str) -> Result<Self, IoError> {
        toml::from_str(text).map_err(|e| IoError::config(format!("Failed to parse settings: {}", e)))
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), IoError> {
        if self.idle_timeout_ms == 0 {
            return Err(IoError::config("idle_timeout_ms must be greater than 0"));
        }
        if self.baud_rate == 0 {
            return Err(IoError::config("baud_rate must be greater than 0"));
        }
        validate_line_settings(self.data_bits, self.stop_bits)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn capture_target(&self) -> CaptureTarget {
        CaptureTarget::parse(&self.capture_output)
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.log_dir)
    }

    pub fn pump_options(&self) -> PumpOptions {
        PumpOptions {
            sink_errors: if self.stop_on_sink_error {
                SinkErrorPolicy::Stop
            } else {
                SinkErrorPolicy::Continue
            },
            byte_limit: self.byte_limit,
        }
    }

    pub fn serial_config(&self) -> Result<SerialConfig, IoError> {
        let port = self
            .port
            .clone()
            .ok_or_else(|| IoError::config("no serial port given"))?;
        Ok(SerialConfig {
            port,
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
        })
    }
}

/// `<config dir>/serialcap/config.toml`
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("serialcap").join("config.toml"))
}

/// Load settings from `path`, or from the default location when `None`.
/// A missing default file yields defaults; a missing explicit file is an error.
pub fn load_settings(path: Option<&Path>) -> Result<BridgeSettings, IoError> {
    let (settings_path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_settings_path() {
            Some(p) => (p, false),
            None => return Ok(BridgeSettings::default()),
        },
    };

    if !settings_path.exists() {
        if explicit {
            return Err(IoError::config(format!(
                "settings file {} does not exist",
                settings_path.display()
            )));
        }
        return Ok(BridgeSettings::default());
    }

    let content = std::fs::read_to_string(&settings_path)
        .map_err(|e| IoError::open(settings_path.display().to_string(), e))?;
    let settings = BridgeSettings::from_toml(&content)?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let settings = BridgeSettings::from_toml("").unwrap();
        assert_eq!(settings, BridgeSettings::default());
        assert_eq!(settings.idle_timeout(), Duration::from_millis(10));
        assert_eq!(settings.mode, OutputMode::Capture);
        assert_eq!(settings.link_type, LinkType::BluetoothHciH4WithPhdr);
        assert_eq!(settings.capture_target(), CaptureTarget::Stdout);
        assert_eq!(settings.pump_options().sink_errors, SinkErrorPolicy::Stop);
    }

    #[test]
    fn test_parse_full_file() {
        let text = r#"
            port = "/dev/ttyUSB0"
            baud_rate = 921600
            parity = "even"
            mode = "log"
            link_type = "ethernet"
            capture_output = "/tmp/hci.pcap"
            idle_timeout_ms = 25
            stop_on_sink_error = false
            byte_limit = 4096
        "#;
        let settings = BridgeSettings::from_toml(text).unwrap();
        settings.validate().unwrap();

        let serial = settings.serial_config().unwrap();
        assert_eq!(serial.port, "/dev/ttyUSB0");
        assert_eq!(serial.baud_rate, 921_600);
        assert_eq!(serial.parity, Parity::Even);
        assert_eq!(serial.data_bits, 8);
        assert_eq!(settings.mode, OutputMode::Log);
        assert_eq!(settings.link_type, LinkType::Ethernet);
        assert_eq!(
            settings.capture_target(),
            CaptureTarget::Path(PathBuf::from("/tmp/hci.pcap"))
        );
        assert_eq!(settings.idle_timeout(), Duration::from_millis(25));
        let options = settings.pump_options();
        assert_eq!(options.sink_errors, SinkErrorPolicy::Continue);
        assert_eq!(options.byte_limit, Some(4096));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(BridgeSettings::from_toml("link_type = \"token_ring\"").is_err());
        assert!(BridgeSettings::from_toml("idle_timeout_ms = 0").unwrap().validate().is_err());
        assert!(BridgeSettings::from_toml("data_bits = 9").unwrap().validate().is_err());
    }

    #[test]
    fn test_missing_port() {
        let settings = BridgeSettings::default();
        assert!(matches!(settings.serial_config(), Err(IoError::Config(_))));
    }

    #[test]
    fn test_load_explicit_file() {
        let path = std::env::temp_dir().join(format!("serialcap-settings-{}.toml", std::process::id()));
        std::fs::write(&path, "port = \"COM3\"\nmode = \"log\"\n").unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.port.as_deref(), Some("COM3"));
        assert_eq!(settings.mode, OutputMode::Log);
        let _ = std::fs::remove_file(&path);

        assert!(load_settings(Some(&path)).is_err());
    }
}
