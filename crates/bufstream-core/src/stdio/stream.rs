//! The buffered stream.
//!
//! A [`Stream`] couples one [`RawIo`] backend with one [`StreamBuffer`].
//! Reads are served from the buffer and refilled a capacity-sized chunk at a
//! time; writes accumulate until the buffer is full, a flush is requested, or
//! the stream changes direction, seeks or closes.
//!
//! The logical position reported by [`Stream::tell`] is always
//! `descriptor offset - unread + unflushed`.

use std::io;
use std::path::Path;

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::log::{self, LogLevel};
use crate::metrics::{StreamMetrics, global_metrics};
use crate::stdio::buffer::{BufferState, StreamBuffer};
use crate::stdio::io::{Descriptor, RawIo, Whence};
use crate::stdio::mode::OpenMode;

/// Buffered stream over a raw descriptor.
#[derive(Debug)]
pub struct Stream<D: RawIo = Descriptor> {
    io: D,
    buf: StreamBuffer,
    eof: bool,
    error: Option<i32>,
    closed: bool,
}

/// Outcome of tearing a stream down.
#[derive(Debug)]
pub(crate) struct Released {
    pub(crate) flushed: Result<(), StreamError>,
    pub(crate) closed: Result<(), StreamError>,
}

impl Stream<Descriptor> {
    /// Open `path` with an `fopen`-style mode string and the default capacity.
    pub fn open(path: impl AsRef<Path>, mode: &str) -> Result<Self, StreamError> {
        Self::open_with(path, mode, StreamConfig::default())
    }

    /// Open `path` with an explicit configuration.
    ///
    /// The mode is validated before anything is allocated or opened.
    pub fn open_with(
        path: impl AsRef<Path>,
        mode: &str,
        config: StreamConfig,
    ) -> Result<Self, StreamError> {
        let path = path.as_ref();
        let attempt = OpenMode::parse(mode).and_then(|open_mode| {
            let buf = StreamBuffer::new(config.capacity())?;
            let io = Descriptor::open(path, open_mode)
                .map_err(|errno| StreamError::Open { errno })?;
            Ok(Self::from_parts(io, buf))
        });
        match &attempt {
            Ok(stream) => log::record(LogLevel::Info, "stream_open", |e| {
                e.with_api("open")
                    .with_fd(stream.fileno())
                    .with_details(serde_json::json!({
                        "path": path.display().to_string(),
                        "mode": mode,
                        "capacity": config.capacity(),
                    }))
            }),
            Err(err) => log::record(LogLevel::Warn, "stream_open_failed", |e| {
                e.with_api("open")
                    .with_errno(err.errno())
                    .with_details(serde_json::json!({
                        "path": path.display().to_string(),
                        "mode": mode,
                    }))
            }),
        }
        attempt
    }
}

impl<D: RawIo> Stream<D> {
    /// Wrap an already-open backend.
    pub fn from_raw_io(io: D, config: StreamConfig) -> Result<Self, StreamError> {
        let buf = StreamBuffer::new(config.capacity())?;
        let stream = Self::from_parts(io, buf);
        log::record(LogLevel::Debug, "stream_open", |e| {
            e.with_api("from_raw_io")
                .with_fd(stream.fileno())
                .with_details(serde_json::json!({ "capacity": config.capacity() }))
        });
        Ok(stream)
    }

    pub(crate) fn from_parts(io: D, buf: StreamBuffer) -> Self {
        StreamMetrics::inc(&global_metrics().opens);
        Self {
            io,
            buf,
            eof: false,
            error: None,
            closed: false,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Descriptor number backing this stream.
    #[must_use]
    pub fn fileno(&self) -> i32 {
        self.io.fd()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    #[must_use]
    pub fn buffer_state(&self) -> BufferState {
        self.buf.state()
    }

    /// True once a read hit end of input. Cleared by seek, write and `clear_err`.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// errno of the most recent failure, until a successful seek or `clear_err`.
    #[must_use]
    pub fn last_error(&self) -> Option<i32> {
        self.error
    }

    /// Reset both the end-of-file and error indicators.
    pub fn clear_err(&mut self) {
        self.eof = false;
        self.error = None;
    }

    fn set_error(&mut self, errno: i32) {
        self.error = Some(errno);
        StreamMetrics::inc(&global_metrics().errors);
    }

    // -----------------------------------------------------------------------
    // Flush and refill
    // -----------------------------------------------------------------------

    /// Commit buffered output to the descriptor.
    ///
    /// Fails with [`StreamError::InvalidOperationOrder`] when the buffer
    /// holds input, without touching the descriptor.
    pub fn flush(&mut self) -> Result<(), StreamError> {
        match self.buf.state() {
            BufferState::Idle => Ok(()),
            BufferState::Reading { .. } => Err(StreamError::InvalidOperationOrder),
            BufferState::Writing { .. } => self.commit(),
        }
    }

    // Writes the pending bytes, resuming after short writes. On failure the
    // uncommitted tail stays buffered.
    fn commit(&mut self) -> Result<(), StreamError> {
        let mut committed = 0usize;
        loop {
            let pending = self.buf.pending();
            if pending.is_empty() {
                break;
            }
            let outcome = match self.io.write(pending) {
                Ok(0) => Err(libc::EIO),
                other => other,
            };
            match outcome {
                Ok(n) => {
                    self.buf.consume_flushed(n);
                    committed += n;
                }
                Err(errno) => {
                    let fd = self.io.fd();
                    let left = self.buf.unflushed();
                    self.set_error(errno);
                    log::record(LogLevel::Warn, "flush_failed", |e| {
                        e.with_api("flush")
                            .with_fd(fd)
                            .with_errno(errno)
                            .with_bytes(left)
                    });
                    return Err(StreamError::Flush { errno });
                }
            }
        }
        self.buf.reset();
        if committed > 0 {
            let metrics = global_metrics();
            StreamMetrics::inc(&metrics.flushes);
            StreamMetrics::add(&metrics.bytes_written, committed);
        }
        Ok(())
    }

    /// Make input available in the buffer and return how much is there.
    ///
    /// Reads from the descriptor only when the buffer is exhausted. Pending
    /// output is flushed first. A return of zero means end of input.
    pub fn refill(&mut self) -> Result<usize, StreamError> {
        if matches!(self.buf.state(), BufferState::Writing { .. }) {
            self.commit()?;
        }
        self.buf.enter_reading();
        match self.buf.unread() {
            0 => self.fill(),
            unread => Ok(unread),
        }
    }

    // One descriptor read into the start of the buffer.
    fn fill(&mut self) -> Result<usize, StreamError> {
        match self.io.read(self.buf.fill_slot()) {
            Ok(n) => {
                self.buf.set_filled(n);
                let metrics = global_metrics();
                StreamMetrics::inc(&metrics.refills);
                StreamMetrics::add(&metrics.bytes_read, n);
                if n == 0 {
                    self.eof = true;
                }
                Ok(n)
            }
            Err(errno) => {
                self.buf.set_filled(0);
                self.fail_read(errno, "refill")
            }
        }
    }

    fn fail_read<T>(&mut self, errno: i32, api: &str) -> Result<T, StreamError> {
        let fd = self.io.fd();
        self.set_error(errno);
        log::record(LogLevel::Warn, "refill_failed", |e| {
            e.with_api(api).with_fd(fd).with_errno(errno)
        });
        Err(StreamError::Read { errno })
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    /// Read up to `count` elements of `size` bytes into `dst`.
    ///
    /// Returns the number of complete elements read. A short count means end
    /// of input or an error; tell them apart with [`is_eof`](Self::is_eof)
    /// and [`is_error`](Self::is_error). `count` is clamped to what fits in
    /// `dst`.
    pub fn read(&mut self, dst: &mut [u8], size: usize, count: usize) -> usize {
        if size == 0 {
            return 0;
        }
        let total = size * count.min(dst.len() / size);
        if total == 0 {
            return 0;
        }
        let (bytes, _) = self.read_into(&mut dst[..total]);
        bytes / size
    }

    fn read_into(&mut self, dst: &mut [u8]) -> (usize, Option<StreamError>) {
        if matches!(self.buf.state(), BufferState::Writing { .. }) {
            if let Err(err) = self.commit() {
                return (0, Some(err));
            }
        }
        self.buf.enter_reading();
        let mut done = self.buf.copy_out(dst);
        while done < dst.len() {
            let rest = &mut dst[done..];
            if rest.len() > self.buf.capacity() {
                match self.io.read(rest) {
                    Ok(0) => {
                        self.eof = true;
                        break;
                    }
                    Ok(n) => {
                        let metrics = global_metrics();
                        StreamMetrics::inc(&metrics.direct_reads);
                        StreamMetrics::add(&metrics.bytes_read, n);
                        done += n;
                    }
                    Err(errno) => return (done, self.fail_read::<()>(errno, "read").err()),
                }
            } else {
                match self.fill() {
                    Ok(0) => break,
                    Ok(_) => done += self.buf.copy_out(&mut dst[done..]),
                    Err(err) => return (done, Some(err)),
                }
            }
        }
        (done, None)
    }

    /// Read one byte. `None` signals end of input or an error.
    pub fn get_byte(&mut self) -> Option<u8> {
        if matches!(self.buf.state(), BufferState::Writing { .. }) && self.commit().is_err() {
            return None;
        }
        self.buf.enter_reading();
        if let Some(byte) = self.buf.next_byte() {
            return Some(byte);
        }
        match self.fill() {
            Ok(n) if n > 0 => self.buf.next_byte(),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Writing
    // -----------------------------------------------------------------------

    /// Write up to `count` elements of `size` bytes from `src`.
    ///
    /// Output is buffered and committed a full buffer at a time. Returns the
    /// number of complete elements accepted; a short count means a flush
    /// failed and the error indicator is set.
    pub fn write(&mut self, src: &[u8], size: usize, count: usize) -> usize {
        if size == 0 {
            return 0;
        }
        let total = size * count.min(src.len() / size);
        if total == 0 {
            return 0;
        }
        let (bytes, _) = self.write_from(&src[..total]);
        bytes / size
    }

    fn write_from(&mut self, src: &[u8]) -> (usize, Option<StreamError>) {
        self.eof = false;
        if let Err(err) = self.prepare_write() {
            return (0, Some(err));
        }
        let mut done = 0;
        while done < src.len() {
            if let Err(err) = self.make_room() {
                return (done, Some(err));
            }
            done += self.buf.copy_in(&src[done..]);
        }
        (done, None)
    }

    /// Write one byte, returning it on success.
    pub fn put_byte(&mut self, byte: u8) -> Result<u8, StreamError> {
        self.eof = false;
        self.prepare_write()?;
        self.make_room()?;
        let stored = self.buf.push_byte(byte);
        debug_assert!(stored);
        Ok(byte)
    }

    // Turns the buffer into a write buffer. Unread input is dropped and the
    // descriptor rewound by its length so output lands at the logical position.
    fn prepare_write(&mut self) -> Result<(), StreamError> {
        if let BufferState::Reading { .. } = self.buf.state() {
            // Unread input stays buffered until the rewind succeeds.
            let unread = self.buf.unread();
            if unread > 0 {
                if let Err(errno) = self.io.seek(-(unread as i64), Whence::Current) {
                    return Err(self.fail_seek(errno, "write"));
                }
            }
            self.buf.reset();
        }
        self.buf.enter_writing();
        Ok(())
    }

    fn make_room(&mut self) -> Result<(), StreamError> {
        if self.buf.is_full() {
            self.commit()
                .map_err(|err| StreamError::Write { errno: err.errno() })?;
            self.buf.enter_writing();
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Positioning
    // -----------------------------------------------------------------------

    /// Reposition the stream and return the new absolute offset.
    ///
    /// Pending output is flushed first (a flush failure aborts the seek);
    /// unread input is discarded, with `Whence::Current` measured from the
    /// logical position. Success clears the EOF and error indicators.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64, StreamError> {
        let offset = match self.buf.state() {
            BufferState::Writing { .. } => {
                self.commit()?;
                offset
            }
            BufferState::Reading { .. } => {
                let unread = self.buf.unread() as i64;
                self.buf.reset();
                if whence == Whence::Current {
                    offset.saturating_sub(unread)
                } else {
                    offset
                }
            }
            BufferState::Idle => offset,
        };
        match self.io.seek(offset, whence) {
            Ok(pos) => {
                self.eof = false;
                self.error = None;
                u64::try_from(pos).map_err(|_| StreamError::Seek {
                    errno: libc::EOVERFLOW,
                })
            }
            Err(errno) => Err(self.fail_seek(errno, "seek")),
        }
    }

    fn fail_seek(&mut self, errno: i32, api: &str) -> StreamError {
        let fd = self.io.fd();
        self.set_error(errno);
        log::record(LogLevel::Warn, "seek_failed", |e| {
            e.with_api(api).with_fd(fd).with_errno(errno)
        });
        StreamError::Seek { errno }
    }

    /// Logical position: descriptor offset adjusted for buffered bytes.
    pub fn tell(&mut self) -> Result<u64, StreamError> {
        let pos = match self.io.seek(0, Whence::Current) {
            Ok(pos) => pos,
            Err(errno) => return Err(self.fail_seek(errno, "tell")),
        };
        u64::try_from(pos + self.buf.position_delta()).map_err(|_| StreamError::Seek {
            errno: libc::EOVERFLOW,
        })
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Flush pending output and release the descriptor.
    ///
    /// The descriptor is released even when the flush fails; the flush
    /// failure is reported in preference to a close failure.
    pub fn close(mut self) -> Result<(), StreamError> {
        let released = self.release("close");
        released.flushed.and(released.closed)
    }

    pub(crate) fn release(&mut self, api: &str) -> Released {
        let flushed = match self.buf.state() {
            BufferState::Writing { .. } => self.commit(),
            _ => Ok(()),
        };
        self.buf.reset();
        let fd = self.io.fd();
        let closed = self.io.close().map_err(|errno| StreamError::Close { errno });
        self.closed = true;
        StreamMetrics::inc(&global_metrics().closes);

        let errno = flushed
            .as_ref()
            .err()
            .or(closed.as_ref().err())
            .map(StreamError::errno);
        let level = if errno.is_some() {
            LogLevel::Warn
        } else {
            LogLevel::Info
        };
        log::record(level, "stream_close", |e| {
            let e = e.with_api(api).with_fd(fd);
            match errno {
                Some(errno) => e.with_errno(errno),
                None => e,
            }
        });
        Released { flushed, closed }
    }
}

impl<D: RawIo> Drop for Stream<D> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let fd = self.io.fd();
        log::record(LogLevel::Debug, "stream_dropped_unclosed", |e| e.with_fd(fd));
        let _ = self.release("drop");
    }
}

// ---------------------------------------------------------------------------
// std::io integration
// ---------------------------------------------------------------------------

impl<D: RawIo> io::Read for Stream<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.read_into(buf) {
            (0, Some(err)) => Err(err.into()),
            (n, _) => Ok(n),
        }
    }
}

impl<D: RawIo> io::Write for Stream<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.write_from(buf) {
            (0, Some(err)) => Err(err.into()),
            (n, _) => Ok(n),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.buf.state() {
            BufferState::Writing { .. } => self.commit().map_err(io::Error::from),
            _ => Ok(()),
        }
    }
}

impl<D: RawIo> io::Seek for Stream<D> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            io::SeekFrom::Start(n) => (
                i64::try_from(n).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?,
                Whence::Start,
            ),
            io::SeekFrom::Current(n) => (n, Whence::Current),
            io::SeekFrom::End(n) => (n, Whence::End),
        };
        Stream::seek(self, offset, whence).map_err(io::Error::from)
    }
}
