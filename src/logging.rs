// src/logging.rs
//
// Diagnostics always go to stderr; stdout may be carrying the pcap stream.
// `tlog!` stamps each line with local wall-clock time. After
// `init_file_logging` the same lines are also appended to a session file.

use std::fmt::Display;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const STAMP_FORMAT: &str = "%H:%M:%S%.3f";

/// Name of the link that follows the newest session file (Unix only)
pub const LATEST_LOG_LINK: &str = "serialcap.log";

#[doc(hidden)]
pub static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);

/// Log a line to stderr (and the session file, if open), prefixed with
/// `HH:MM:SS.mmm` local time.
#[macro_export]
macro_rules! tlog {
    ($($arg:tt)*) => {
        $crate::logging::write_line(&format!("{} {}", $crate::logging::stamp(), format_args!($($arg)*)))
    };
}

#[doc(hidden)]
pub fn stamp() -> impl Display {
    chrono::Local::now().format(STAMP_FORMAT)
}

#[doc(hidden)]
pub fn write_line(line: &str) {
    eprintln!("{}", line);
    if let Ok(mut slot) = LOG_FILE.lock() {
        if let Some(file) = slot.as_mut() {
            let _ = writeln!(file, "{}", line);
        }
    }
}

/// Open `<dir>/YYYYmmdd-HHMMSS-serialcap.log` and mirror `tlog!` output into
/// it until `stop_file_logging`. Returns the new file's path.
pub fn init_file_logging(dir: &Path) -> Result<PathBuf, String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Cannot create log directory {}: {}", dir.display(), e))?;

    let name = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-serialcap.log")
        .to_string();
    let path = dir.join(&name);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("Cannot open log file {}: {}", path.display(), e))?;

    #[cfg(unix)]
    {
        if let Err(e) = relink_latest(dir, &name) {
            write_line(&format!(
                "{} [logging] Could not point {} at {}: {}",
                stamp(),
                LATEST_LOG_LINK,
                name,
                e
            ));
        }
    }

    match LOG_FILE.lock() {
        Ok(mut slot) => *slot = Some(file),
        Err(_) => return Err("Log file lock poisoned".to_string()),
    }

    write_line(&format!("{} [logging] Session log: {}", stamp(), path.display()));
    Ok(path)
}

/// Close the session file; later `tlog!` output goes to stderr only.
pub fn stop_file_logging() {
    let closed = LOG_FILE.lock().ok().and_then(|mut slot| slot.take());
    if closed.is_some() {
        eprintln!("{} [logging] Session log closed", stamp());
    }
}

#[cfg(unix)]
fn relink_latest(dir: &Path, target: &str) -> std::io::Result<()> {
    let link = dir.join(LATEST_LOG_LINK);
    match std::fs::remove_file(&link) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::os::unix::fs::symlink(target, link)
}
