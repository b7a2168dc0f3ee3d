//! Thin `libc` veneer for the descriptor primitives the streams need.
//!
//! Every wrapper returns `Result<_, i32>` where the error is the errno left
//! by the failing call. No retry policy lives here; callers decide what to
//! do with `EINTR`.

use std::ffi::CStr;
use std::os::fd::{FromRawFd, OwnedFd};

fn last_errno() -> i32 {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::EIO)
}

/// `open(path, flags, mode)`.
pub fn sys_open(path: &CStr, flags: i32, mode: u32) -> Result<i32, i32> {
    // SAFETY: `path` is a valid NUL-terminated string for the duration of the call.
    let fd = unsafe { libc::open(path.as_ptr(), flags, mode as libc::c_uint) };
    if fd < 0 { Err(last_errno()) } else { Ok(fd) }
}

/// `read(fd, buf, buf.len())`.
pub fn sys_read(fd: i32, buf: &mut [u8]) -> Result<usize, i32> {
    // SAFETY: `buf` is a writable region of exactly `buf.len()` bytes.
    let rc = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
    if rc < 0 { Err(last_errno()) } else { Ok(rc as usize) }
}

/// `write(fd, buf, buf.len())`.
pub fn sys_write(fd: i32, buf: &[u8]) -> Result<usize, i32> {
    // SAFETY: `buf` is a readable region of exactly `buf.len()` bytes.
    let rc = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
    if rc < 0 { Err(last_errno()) } else { Ok(rc as usize) }
}

/// `lseek(fd, offset, whence)`.
pub fn sys_lseek(fd: i32, offset: i64, whence: i32) -> Result<i64, i32> {
    // SAFETY: lseek takes no pointers; a bad fd just returns EBADF.
    let rc = unsafe { libc::lseek(fd, offset as libc::off_t, whence) };
    if rc < 0 { Err(last_errno()) } else { Ok(rc as i64) }
}

/// `close(fd)`. The descriptor is gone afterwards even on error, so never retry.
pub fn sys_close(fd: i32) -> Result<(), i32> {
    // SAFETY: close takes no pointers; a bad fd just returns EBADF.
    let rc = unsafe { libc::close(fd) };
    if rc < 0 { Err(last_errno()) } else { Ok(()) }
}

/// `pipe2(O_CLOEXEC)`, returning `(read_end, write_end)`.
///
/// Both ends are close-on-exec so only the end explicitly handed to a child
/// survives into it.
pub fn sys_pipe() -> Result<(OwnedFd, OwnedFd), i32> {
    let mut fds = [-1i32; 2];
    // SAFETY: `fds` is a writable array of two c_ints as pipe2 requires.
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if rc < 0 {
        return Err(last_errno());
    }
    // SAFETY: pipe2 succeeded, so both descriptors are open and owned by nobody else.
    let read_end = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    // SAFETY: as above.
    let write_end = unsafe { OwnedFd::from_raw_fd(fds[1]) };
    Ok((read_end, write_end))
}
