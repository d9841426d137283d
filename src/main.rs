// serialcap: bridge a serial capture probe to Wireshark (pcap) or a hex log.
//
//   serialcap -p /dev/ttyUSB0 -b 921600 | wireshark -k -i -
//   serialcap -p COM3 --mode log --log-dir captures/
//   serialcap --replay dump.bin -o dump.pcap --link ethernet

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use serialcap_lib::capture::{LinkType, OutputMode};
use serialcap_lib::io::serial::Parity;
use serialcap_lib::settings::{load_settings, BridgeSettings};
use serialcap_lib::{tlog, ByteSource};

#[derive(Parser, Debug)]
#[command(name = "serialcap", version, about = "Serial capture probe to pcap / hex log bridge")]
struct Args {
    /// Settings file (default: <config dir>/serialcap/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port, e.g. /dev/ttyUSB0 or COM3
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Data bits (5-8)
    #[arg(long)]
    data_bits: Option<u8>,

    /// Stop bits (1 or 2)
    #[arg(long)]
    stop_bits: Option<u8>,

    /// Parity: none, odd, even
    #[arg(long)]
    parity: Option<String>,

    /// Output mode: capture (pcap) or log (hex dump)
    #[arg(short, long)]
    mode: Option<String>,

    /// Link type: ethernet, bluetooth_hci_h4_with_phdr, bluetooth_hci_h4, user0
    #[arg(short, long)]
    link: Option<String>,

    /// Capture output: "-" for stdout, or a file / FIFO path
    #[arg(short, long)]
    output: Option<String>,

    /// Directory for hex logs and diagnostic logs
    #[arg(long)]
    log_dir: Option<String>,

    /// Idle flush timeout in milliseconds
    #[arg(long)]
    idle_ms: Option<u64>,

    /// Keep recovering frames when the output fails
    #[arg(long)]
    keep_going: bool,

    /// Stop after reading this many bytes
    #[arg(long)]
    limit: Option<u64>,

    /// Mirror diagnostics into a log file in the log directory
    #[arg(long)]
    log_file: bool,

    /// Read raw bytes from a file instead of a serial port
    #[arg(long, conflicts_with = "port")]
    replay: Option<PathBuf>,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

/// Apply command-line overrides on top of the loaded settings
fn apply_overrides(settings: &mut BridgeSettings, args: &Args) -> Result<(), String> {
    if let Some(port) = &args.port {
        settings.port = Some(port.clone());
    }
    if let Some(baud) = args.baud {
        settings.baud_rate = baud;
    }
    if let Some(bits) = args.data_bits {
        settings.data_bits = bits;
    }
    if let Some(bits) = args.stop_bits {
        settings.stop_bits = bits;
    }
    if let Some(parity) = &args.parity {
        settings.parity = Parity::from_str(parity)?;
    }
    if let Some(mode) = &args.mode {
        settings.mode = OutputMode::from_str(mode)?;
    }
    if let Some(link) = &args.link {
        settings.link_type = LinkType::from_str(link)?;
    }
    if let Some(output) = &args.output {
        settings.capture_output = output.clone();
    }
    if let Some(dir) = &args.log_dir {
        settings.log_dir = dir.clone();
    }
    if let Some(ms) = args.idle_ms {
        settings.idle_timeout_ms = ms;
    }
    if args.keep_going {
        settings.stop_on_sink_error = false;
    }
    if args.limit.is_some() {
        settings.byte_limit = args.limit;
    }
    if args.log_file {
        settings.file_logging = true;
    }
    Ok(())
}

#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
fn print_ports() -> Result<(), String> {
    for p in serialcap_lib::io::serial::list_ports()? {
        let detail = [p.manufacturer, p.product, p.serial_number]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" / ");
        println!("{:<24} {:<16} {}", p.port_name, p.port_type, detail);
    }
    Ok(())
}

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
fn print_ports() -> Result<(), String> {
    Err("Serial ports are not available on this platform".to_string())
}

async fn run(args: Args) -> Result<(), String> {
    if args.list_ports {
        return print_ports();
    }

    let mut settings = load_settings(args.config.as_deref())?;
    apply_overrides(&mut settings, &args)?;

    let source = match &args.replay {
        Some(path) => ByteSource::Replay(path.clone()),
        None => ByteSource::Serial,
    };

    let stats = serialcap_lib::run(settings, source).await?;
    tlog!(
        "[serialcap] Done: {} frame(s), {} resync(s), {} idle flush(es)",
        stats.frames,
        stats.trailer_mismatches + stats.buffer_overflows + stats.short_bodies,
        stats.idle_flushes
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tlog!("[serialcap] {}", e);
            ExitCode::FAILURE
        }
    }
}
