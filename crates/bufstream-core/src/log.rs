//! Structured JSONL event log.
//!
//! Stream lifecycle events (open, close, failed flush, spawn, reap, ...) are
//! recorded as one JSON object per line. Logging is off unless enabled:
//! - `BUFSTREAM_LOG=stderr` writes to standard error.
//! - `BUFSTREAM_LOG=<path>` appends to the named file.
//! - `BUFSTREAM_LOG_LEVEL` sets the minimum level (default `info`).
//!
//! A sink failure is swallowed; logging never fails an I/O operation.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Environment variable selecting the log destination.
pub const LOG_ENV: &str = "BUFSTREAM_LOG";
/// Environment variable selecting the minimum level.
pub const LOG_LEVEL_ENV: &str = "BUFSTREAM_LOG_LEVEL";

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse from string (case-insensitive). Unknown names yield `None`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One structured log record.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    /// Stream operation that produced the event (`open`, `flush`, `pclose`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fd: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create an entry with required fields only. The trace id is assigned on emit.
    #[must_use]
    pub fn new(level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: String::new(),
            level,
            event: event.into(),
            api: None,
            fd: None,
            errno: None,
            bytes: None,
            pid: None,
            exit_code: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_api(mut self, api: impl Into<String>) -> Self {
        self.api = Some(api.into());
        self
    }

    #[must_use]
    pub fn with_fd(mut self, fd: i32) -> Self {
        self.fd = Some(fd);
        self
    }

    #[must_use]
    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = Some(errno);
        self
    }

    #[must_use]
    pub fn with_bytes(mut self, bytes: usize) -> Self {
        self.bytes = Some(bytes as u64);
        self
    }

    #[must_use]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    #[must_use]
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Destination for emitted entries.
#[derive(Debug)]
pub enum LogSink {
    /// Drop everything.
    Disabled,
    Stderr,
    File(BufWriter<File>),
    /// Retain lines in memory (tests and embedders).
    Memory(Vec<String>),
}

impl LogSink {
    fn from_env() -> Self {
        match std::env::var(LOG_ENV) {
            Ok(v) if v.is_empty() || v == "0" || v.eq_ignore_ascii_case("off") => Self::Disabled,
            Ok(v) if v.eq_ignore_ascii_case("stderr") => Self::Stderr,
            Ok(path) => match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => Self::File(BufWriter::new(file)),
                Err(_) => Self::Disabled,
            },
            Err(_) => Self::Disabled,
        }
    }

    fn write_line(&mut self, line: String) {
        match self {
            Self::Disabled => {}
            Self::Stderr => {
                let _ = writeln!(std::io::stderr().lock(), "{line}");
            }
            Self::File(w) => {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
            Self::Memory(lines) => lines.push(line),
        }
    }
}

#[derive(Debug)]
struct Logger {
    sink: LogSink,
    min_level: LogLevel,
    seq: u64,
}

impl Logger {
    fn from_env() -> Self {
        let min_level = std::env::var(LOG_LEVEL_ENV)
            .ok()
            .and_then(|v| LogLevel::from_str_loose(&v))
            .unwrap_or(LogLevel::Info);
        Self {
            sink: LogSink::from_env(),
            min_level,
            seq: 0,
        }
    }

    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("bufstream::{}::{:06}", std::process::id(), self.seq)
    }
}

fn logger() -> &'static Mutex<Logger> {
    static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();
    LOGGER.get_or_init(|| Mutex::new(Logger::from_env()))
}

/// Replace the global sink and minimum level.
pub fn set_sink(sink: LogSink, min_level: LogLevel) {
    let mut guard = logger().lock();
    guard.sink = sink;
    guard.min_level = min_level;
}

/// Take the lines retained by a [`LogSink::Memory`] sink (empty for other sinks).
pub fn drain_memory() -> Vec<String> {
    match &mut logger().lock().sink {
        LogSink::Memory(lines) => std::mem::take(lines),
        _ => Vec::new(),
    }
}

/// True if an entry at `level` would be written anywhere.
#[must_use]
pub fn enabled(level: LogLevel) -> bool {
    let guard = logger().lock();
    !matches!(guard.sink, LogSink::Disabled) && level >= guard.min_level
}

/// Emit a fully-populated entry, assigning its trace id.
pub fn emit(mut entry: LogEntry) {
    let mut guard = logger().lock();
    if matches!(guard.sink, LogSink::Disabled) || entry.level < guard.min_level {
        return;
    }
    if entry.trace_id.is_empty() {
        entry.trace_id = guard.next_trace_id();
    }
    if let Ok(line) = entry.to_jsonl() {
        guard.sink.write_line(line);
    }
}

/// Build and emit an entry only when `level` is enabled.
pub fn record(level: LogLevel, event: &str, build: impl FnOnce(LogEntry) -> LogEntry) {
    if enabled(level) {
        emit(build(LogEntry::new(level, event)));
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

fn now_utc() -> String {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(duration.as_secs(), duration.subsec_millis())
}

/// RFC 3339 UTC timestamp with millisecond precision.
fn format_utc(secs: u64, millis: u32) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60,
    )
}

// Howard Hinnant's days-to-civil conversion.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month as u32, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_serializes_required_fields_only() {
        let entry = LogEntry::new(LogLevel::Info, "stream_open");
        let json = entry.to_jsonl().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["timestamp"].is_string());
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["event"], "stream_open");
        assert!(parsed.get("fd").is_none());
        assert!(parsed.get("errno").is_none());
    }

    #[test]
    fn entry_optional_fields_roundtrip() {
        let entry = LogEntry::new(LogLevel::Warn, "flush_failed")
            .with_api("flush")
            .with_fd(7)
            .with_errno(libc::EPIPE)
            .with_bytes(12)
            .with_details(serde_json::json!({"pending": 12}));
        let json = entry.to_jsonl().unwrap();
        let back: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.level, LogLevel::Warn);
        assert_eq!(back.api.as_deref(), Some("flush"));
        assert_eq!(back.fd, Some(7));
        assert_eq!(back.errno, Some(libc::EPIPE));
        assert_eq!(back.bytes, Some(12));
        assert_eq!(back.details.unwrap()["pending"], 12);
    }

    #[test]
    fn level_parsing_and_ordering() {
        assert_eq!(LogLevel::from_str_loose("WARN"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str_loose("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str_loose(" debug "), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str_loose("loud"), None);
        assert!(LogLevel::Error > LogLevel::Info);
        assert!(LogLevel::Trace < LogLevel::Debug);
    }

    #[test]
    fn timestamp_formatting() {
        assert_eq!(format_utc(0, 0), "1970-01-01T00:00:00.000Z");
        // 2024-02-29T12:34:56Z (leap day)
        assert_eq!(format_utc(1_709_210_096, 7), "2024-02-29T12:34:56.007Z");
        // 2000-03-01T00:00:00Z
        assert_eq!(format_utc(951_868_800, 999), "2000-03-01T00:00:00.999Z");
    }

    #[test]
    fn memory_sink_filters_by_level_and_assigns_trace_ids() {
        let _guard = crate::test_support::log_lock();
        set_sink(LogSink::Memory(Vec::new()), LogLevel::Warn);

        record(LogLevel::Info, "ignored", |e| e);
        record(LogLevel::Warn, "kept", |e| e.with_fd(3));
        emit(LogEntry::new(LogLevel::Error, "also_kept"));

        let lines = drain_memory();
        set_sink(LogSink::Disabled, LogLevel::Info);

        assert_eq!(lines.len(), 2);
        let first: LogEntry = serde_json::from_str(&lines[0]).unwrap();
        let second: LogEntry = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(first.event, "kept");
        assert_eq!(first.fd, Some(3));
        assert_eq!(second.event, "also_kept");
        assert!(first.trace_id.starts_with("bufstream::"));
        assert_ne!(first.trace_id, second.trace_id);
    }

    #[test]
    fn disabled_sink_reports_not_enabled() {
        let _guard = crate::test_support::log_lock();
        set_sink(LogSink::Disabled, LogLevel::Trace);
        assert!(!enabled(LogLevel::Error));
        assert!(drain_memory().is_empty());
    }
}
