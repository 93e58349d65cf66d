//! Logging setup and helpers.
//!
//! Everything goes through the `log` facade. [`init_logging`] installs env_logger
//! with a UTC-timestamped single-line format, an optional log file and a separate
//! security log for records with target `security`.

use crate::config::LoggingConfig;
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Log a security-relevant event (failed logins, refused sessions).
macro_rules! sec_log {
    ($($arg:tt)*) => { log::warn!(target: "security", $($arg)*); };
}
pub(crate) use sec_log;

const MAX_PREVIEW: usize = 120;

/// Make peer-supplied text safe for a single log line.
///
/// Control characters are escaped (`\n`, `\r`, `\t`, `\xNN`) and anything past
/// [`MAX_PREVIEW`] characters is replaced by an ellipsis.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 4);
    for (count, ch) in s.chars().enumerate() {
        if count == MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Lossy variant for raw transport bytes.
pub fn escape_bytes(bytes: &[u8]) -> String {
    escape_log(&String::from_utf8_lossy(bytes))
}

fn open_append(path: &str) -> Option<File> {
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Install the global logger. `verbosity` (from `-v`) overrides the configured level.
pub fn init_logging(config: Option<&LoggingConfig>, verbosity: u8) {
    let mut builder = env_logger::Builder::new();
    let level = match verbosity {
        0 => config
            .and_then(|c| c.level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(level);

    let log_file = config
        .and_then(|c| c.file.as_deref())
        .and_then(open_append)
        .map(|f| Arc::new(Mutex::new(f)));
    let security_path = config.and_then(|c| c.security_file.clone());
    // Foreground runs also echo to the terminal when a log file is in use
    let is_tty = atty::is(atty::Stream::Stdout);

    builder.format(move |fmt, record| {
        let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let line = format!("{} [{}] {}", ts, record.level(), record.args());

        if record.target() == "security" {
            if let Some(mut sf) = security_path.as_deref().and_then(open_append) {
                let _ = writeln!(sf, "{}", line);
            }
        }

        match &log_file {
            Some(file) => {
                if let Ok(mut guard) = file.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            }
            None => writeln!(fmt, "{}", line),
        }
    });
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_control_characters() {
        assert_eq!(escape_log("a\nb\r\tc"), "a\\nb\\r\\tc");
        assert_eq!(escape_log("bell\u{7}"), "bell\\x07");
        assert_eq!(escape_bytes(b"x\xFFy"), "x\u{FFFD}y");
    }

    #[test]
    fn long_input_is_capped() {
        let long = "x".repeat(MAX_PREVIEW + 50);
        let out = escape_log(&long);
        assert_eq!(out.chars().count(), MAX_PREVIEW + 1);
        assert!(out.ends_with('…'));
    }
}
