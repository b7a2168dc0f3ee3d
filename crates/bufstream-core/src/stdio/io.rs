//! Unbuffered descriptor I/O underneath a stream.

use std::ffi::CString;
use std::os::fd::{IntoRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::stdio::mode::{CREATE_PERMISSIONS, OpenMode};
use crate::sys;

/// Reference point for a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Whence {
    /// `SEEK_SET`
    Start,
    /// `SEEK_CUR`
    Current,
    /// `SEEK_END`
    End,
}

impl Whence {
    #[must_use]
    pub const fn to_raw(self) -> i32 {
        match self {
            Self::Start => libc::SEEK_SET,
            Self::Current => libc::SEEK_CUR,
            Self::End => libc::SEEK_END,
        }
    }

    #[must_use]
    pub const fn from_raw(whence: i32) -> Option<Self> {
        match whence {
            libc::SEEK_SET => Some(Self::Start),
            libc::SEEK_CUR => Some(Self::Current),
            libc::SEEK_END => Some(Self::End),
            _ => None,
        }
    }
}

/// Raw, unbuffered transfer primitives a stream is built on.
///
/// Errors are errno values. `close` must be idempotent: the first call
/// releases the handle and later calls succeed without doing anything.
pub trait RawIo {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, i32>;
    fn write(&mut self, buf: &[u8]) -> Result<usize, i32>;
    /// Reposition and return the resulting absolute offset.
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<i64, i32>;
    fn close(&mut self) -> Result<(), i32>;
    /// Underlying descriptor number, or `-1` once closed.
    fn fd(&self) -> i32;
}

/// An owned OS file descriptor.
///
/// Closed exactly once, either through [`RawIo::close`] or on drop.
#[derive(Debug)]
pub struct Descriptor {
    fd: i32,
}

impl Descriptor {
    /// Open `path` with the flags of `mode`.
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self, i32> {
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| libc::EINVAL)?;
        let fd = sys::sys_open(&c_path, mode.oflags(), CREATE_PERMISSIONS)?;
        Ok(Self { fd })
    }
}

impl From<OwnedFd> for Descriptor {
    fn from(fd: OwnedFd) -> Self {
        Self {
            fd: fd.into_raw_fd(),
        }
    }
}

fn retry_eintr<T>(mut op: impl FnMut() -> Result<T, i32>) -> Result<T, i32> {
    loop {
        match op() {
            Err(libc::EINTR) => continue,
            other => return other,
        }
    }
}

impl RawIo for Descriptor {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, i32> {
        retry_eintr(|| sys::sys_read(self.fd, &mut *buf))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, i32> {
        retry_eintr(|| sys::sys_write(self.fd, buf))
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<i64, i32> {
        sys::sys_lseek(self.fd, offset, whence.to_raw())
    }

    fn close(&mut self) -> Result<(), i32> {
        if self.fd < 0 {
            return Ok(());
        }
        let fd = std::mem::replace(&mut self.fd, -1);
        sys::sys_close(fd)
    }

    fn fd(&self) -> i32 {
        self.fd
    }
}

impl Drop for Descriptor {
    fn drop(&mut self) {
        let _ = RawIo::close(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whence_matches_libc() {
        for w in [Whence::Start, Whence::Current, Whence::End] {
            assert_eq!(Whence::from_raw(w.to_raw()), Some(w));
        }
        assert_eq!(Whence::Start.to_raw(), 0);
        assert_eq!(Whence::Current.to_raw(), 1);
        assert_eq!(Whence::End.to_raw(), 2);
        assert_eq!(Whence::from_raw(7), None);
    }

    #[test]
    fn pipe_descriptor_roundtrip_and_close_once() {
        let (r, w) = sys::sys_pipe().unwrap();
        let mut reader = Descriptor::from(r);
        let mut writer = Descriptor::from(w);
        assert!(reader.fd() >= 0);

        assert_eq!(writer.write(b"xyz").unwrap(), 3);
        writer.close().unwrap();
        assert_eq!(writer.fd(), -1);
        assert_eq!(writer.close(), Ok(()));

        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert_eq!(reader.seek(0, Whence::Current), Err(libc::ESPIPE));
    }

    #[test]
    fn open_missing_file_reports_errno() {
        let err = Descriptor::open(Path::new("/nonexistent/bufstream/x"), OpenMode::Read);
        assert_eq!(err.unwrap_err(), libc::ENOENT);
    }

    #[test]
    fn open_rejects_interior_nul() {
        let err = Descriptor::open(Path::new("bad\0name"), OpenMode::Read);
        assert_eq!(err.unwrap_err(), libc::EINVAL);
    }
}
