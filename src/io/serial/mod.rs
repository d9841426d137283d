// src/io/serial/mod.rs
//
// Serial transport with deframing.
//
// - framer.rs - sync/length/trailer state machine and the locked deframer
// - idle.rs   - one-shot idle flush timer
// - reader.rs - port open/enumeration and the read pump
// - utils.rs  - line settings and serialport conversions

pub mod framer;
pub mod idle;
pub mod reader;
pub(crate) mod utils;

pub use framer::{Deframer, DeframerStats, FrameParser, ParseOutcome};
pub use idle::{IdleFlushTimer, DEFAULT_IDLE_TIMEOUT};
pub use reader::{pump, PumpOptions, SerialConfig, SinkErrorPolicy, StreamEnd};
#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub use reader::{list_ports, open_port};
pub use utils::Parity;
