//! Process-pipe streams (`popen`/`pclose`).
//!
//! A [`ProcessStream`] runs `sh -c <command>` with one end of a fresh pipe
//! as the child's stdout (kind `"r"`) or stdin (kind `"w"`), and drives the
//! parent's end through an ordinary buffered [`Stream`].
//!
//! Lifecycle: the pipe and child are created inside [`ProcessStream::open`],
//! the returned value is attached to a running child, and
//! [`ProcessStream::close`] consumes it after flushing, releasing the pipe
//! and reaping the child. Dropping an unclosed stream does the same, minus
//! the status report.

mod status;

pub use status::WaitStatus;

use std::ffi::OsStr;
use std::io;
use std::ops::{Deref, DerefMut};
use std::process::{Child, Command, Stdio};

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::log::{self, LogLevel};
use crate::metrics::{StreamMetrics, global_metrics};
use crate::stdio::{Descriptor, Stream, StreamBuffer};
use crate::sys;

/// Shell used to interpret commands.
pub const SHELL: &str = "sh";

/// Which side of the child the parent talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipeKind {
    /// `"r"`: the parent reads the child's stdout.
    Read,
    /// `"w"`: the parent writes the child's stdin.
    Write,
}

impl PipeKind {
    /// Accepts exactly `"r"` or `"w"`.
    pub fn parse(kind: &str) -> Result<Self, StreamError> {
        match kind {
            "r" => Ok(Self::Read),
            "w" => Ok(Self::Write),
            _ => Err(StreamError::InvalidMode {
                mode: kind.to_owned(),
            }),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "r",
            Self::Write => "w",
        }
    }
}

fn io_errno(err: &io::Error, fallback: i32) -> i32 {
    err.raw_os_error().unwrap_or(fallback)
}

/// A buffered stream connected to a child process.
#[derive(Debug)]
pub struct ProcessStream {
    stream: Stream,
    child: Option<Child>,
    kind: PipeKind,
}

impl ProcessStream {
    /// Spawn `command` with the default buffer capacity.
    pub fn open(command: impl AsRef<OsStr>, kind: &str) -> Result<Self, StreamError> {
        Self::open_with(command, kind, StreamConfig::default())
    }

    /// Spawn `command` with an explicit configuration.
    pub fn open_with(
        command: impl AsRef<OsStr>,
        kind: &str,
        config: StreamConfig,
    ) -> Result<Self, StreamError> {
        let command = command.as_ref();
        let attempt = PipeKind::parse(kind).and_then(|kind| Self::spawn(command, kind, config));
        if let Err(err) = &attempt {
            log::record(LogLevel::Warn, "stream_open_failed", |e| {
                e.with_api("popen")
                    .with_errno(err.errno())
                    .with_details(serde_json::json!({
                        "command": command.to_string_lossy(),
                        "kind": kind,
                    }))
            });
        }
        attempt
    }

    fn spawn(command: &OsStr, kind: PipeKind, config: StreamConfig) -> Result<Self, StreamError> {
        let buf = StreamBuffer::new(config.capacity())?;
        let (read_end, write_end) = sys::sys_pipe().map_err(|errno| StreamError::Pipe { errno })?;
        let (parent_end, child_end) = match kind {
            PipeKind::Read => (read_end, write_end),
            PipeKind::Write => (write_end, read_end),
        };

        let mut cmd = Command::new(SHELL);
        cmd.arg("-c").arg(command);
        match kind {
            PipeKind::Read => {
                cmd.stdout(Stdio::from(child_end));
            }
            PipeKind::Write => {
                cmd.stdin(Stdio::from(child_end));
            }
        }
        let spawned = cmd.spawn();
        // The command still owns the child's end; it must go before the
        // parent can ever see EOF on its own end.
        drop(cmd);
        let child = spawned.map_err(|err| StreamError::Spawn {
            errno: io_errno(&err, libc::EIO),
        })?;

        let stream = Stream::from_parts(Descriptor::from(parent_end), buf);
        StreamMetrics::inc(&global_metrics().spawns);
        log::record(LogLevel::Info, "process_spawn", |e| {
            e.with_api("popen")
                .with_fd(stream.fileno())
                .with_pid(child.id())
                .with_details(serde_json::json!({
                    "command": command.to_string_lossy(),
                    "kind": kind.as_str(),
                    "capacity": config.capacity(),
                }))
        });
        Ok(Self {
            stream,
            child: Some(child),
            kind,
        })
    }

    #[must_use]
    pub fn kind(&self) -> PipeKind {
        self.kind
    }

    /// Process id of the child.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Flush, release the pipe and wait for the child.
    ///
    /// Returns the child's raw wait status. A flush failure is reported
    /// instead of the status, but the child is reaped either way.
    pub fn close(mut self) -> Result<WaitStatus, StreamError> {
        let released = self.stream.release("pclose");
        let waited = self.reap();
        released.flushed?;
        waited
    }

    fn reap(&mut self) -> Result<WaitStatus, StreamError> {
        let Some(mut child) = self.child.take() else {
            return Err(StreamError::Wait {
                errno: libc::ECHILD,
            });
        };
        let pid = child.id();
        match child.wait() {
            Ok(status) => {
                let status = WaitStatus::from(status);
                StreamMetrics::inc(&global_metrics().reaps);
                log::record(LogLevel::Info, "process_reaped", |e| {
                    let e = e
                        .with_api("pclose")
                        .with_pid(pid)
                        .with_details(serde_json::json!({ "status": status.raw() }));
                    match status.exit_code() {
                        Some(code) => e.with_exit_code(code),
                        None => e,
                    }
                });
                Ok(status)
            }
            Err(err) => {
                let errno = io_errno(&err, libc::ECHILD);
                log::record(LogLevel::Error, "process_wait_failed", |e| {
                    e.with_api("pclose").with_pid(pid).with_errno(errno)
                });
                Err(StreamError::Wait { errno })
            }
        }
    }
}

impl Drop for ProcessStream {
    fn drop(&mut self) {
        if self.child.is_none() {
            return;
        }
        log::record(LogLevel::Debug, "stream_dropped_unclosed", |e| {
            e.with_api("pclose").with_fd(self.stream.fileno())
        });
        let _ = self.stream.release("drop");
        let _ = self.reap();
    }
}

impl Deref for ProcessStream {
    type Target = Stream;

    fn deref(&self) -> &Stream {
        &self.stream
    }
}

impl DerefMut for ProcessStream {
    fn deref_mut(&mut self) -> &mut Stream {
        &mut self.stream
    }
}

impl io::Read for ProcessStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.stream, buf)
    }
}

impl io::Write for ProcessStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut self.stream, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.stream)
    }
}

/// Pipes are not seekable; this always fails with `ESPIPE`.
impl io::Seek for ProcessStream {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        io::Seek::seek(&mut self.stream, pos)
    }
}
