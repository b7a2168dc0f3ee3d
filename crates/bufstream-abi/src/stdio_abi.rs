//! ABI layer for the buffered file stream functions.
//!
//! Provides `my_fopen`/`my_fclose`, buffered transfer (`my_fread`,
//! `my_fwrite`, `my_fgetc`, `my_fputc`), positioning (`my_fseek`,
//! `my_ftell`), `my_fflush`, and the status accessors.
//!
//! A `MY_FILE *` is a leaked `Box<MyFile>`; `my_fclose` and `my_pclose`
//! reclaim it. Every entry point tolerates a null handle.

use std::ffi::{CStr, OsStr, c_char, c_int, c_long, c_void};
use std::os::unix::ffi::OsStrExt;

use bufstream_core::{ProcessStream, Stream, StreamError, Whence};

/// End-of-file / failure sentinel returned by the character functions.
pub const MY_EOF: c_int = -1;
pub const MY_SEEK_SET: c_int = 0;
pub const MY_SEEK_CUR: c_int = 1;
pub const MY_SEEK_END: c_int = 2;

/// The object behind a `MY_FILE *`.
#[derive(Debug)]
pub enum MyFile {
    File(Stream),
    Process(ProcessStream),
}

impl MyFile {
    pub(crate) fn stream(&mut self) -> &mut Stream {
        match self {
            Self::File(s) => s,
            Self::Process(p) => p,
        }
    }

    fn stream_ref(&self) -> &Stream {
        match self {
            Self::File(s) => s,
            Self::Process(p) => p,
        }
    }
}

#[inline]
pub(crate) unsafe fn set_abi_errno(val: c_int) {
    let p = unsafe { libc::__errno_location() };
    unsafe { *p = val };
}

pub(crate) unsafe fn report(err: &StreamError) {
    unsafe { set_abi_errno(err.errno()) };
}

/// Hand a stream to the caller.
pub(crate) fn into_handle(file: MyFile) -> *mut MyFile {
    Box::into_raw(Box::new(file))
}

/// Borrow the object behind a handle, or `None` for null.
unsafe fn handle<'a>(stream: *mut MyFile) -> Option<&'a mut MyFile> {
    unsafe { stream.as_mut() }
}

/// Read a NUL-terminated string argument as UTF-8.
pub(crate) unsafe fn c_str_arg<'a>(ptr: *const c_char) -> Option<&'a CStr> {
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(ptr) })
    }
}

/// Convert a `size * nmemb` request into a byte count.
fn request_len(size: usize, nmemb: usize) -> Option<usize> {
    size.checked_mul(nmemb).filter(|&n| n <= isize::MAX as usize)
}

// ---------------------------------------------------------------------------
// Open / close
// ---------------------------------------------------------------------------

/// Open `pathname` in `mode` (`r`, `r+`, `w`, `w+`, `a`, `a+`).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn my_fopen(pathname: *const c_char, mode: *const c_char) -> *mut MyFile {
    let (Some(path), Some(mode)) = (unsafe { c_str_arg(pathname) }, unsafe { c_str_arg(mode) })
    else {
        unsafe { set_abi_errno(libc::EINVAL) };
        return std::ptr::null_mut();
    };
    let path = OsStr::from_bytes(path.to_bytes());
    let mode = mode.to_str().unwrap_or("");
    match Stream::open(path, mode) {
        Ok(s) => into_handle(MyFile::File(s)),
        Err(err) => {
            unsafe { report(&err) };
            std::ptr::null_mut()
        }
    }
}

/// Flush, close and free a stream opened by `my_fopen`.
///
/// A process handle is still closed and freed, but the call reports failure.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn my_fclose(stream: *mut MyFile) -> c_int {
    if stream.is_null() {
        unsafe { set_abi_errno(libc::EBADF) };
        return MY_EOF;
    }
    let file = unsafe { Box::from_raw(stream) };
    match *file {
        MyFile::File(s) => match s.close() {
            Ok(()) => 0,
            Err(err) => {
                unsafe { report(&err) };
                MY_EOF
            }
        },
        MyFile::Process(p) => {
            let _ = p.close();
            unsafe { set_abi_errno(libc::EINVAL) };
            MY_EOF
        }
    }
}

/// Descriptor backing the stream, or -1.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn my_fileno(stream: *mut MyFile) -> c_int {
    match unsafe { handle(stream) } {
        Some(file) => file.stream_ref().fileno(),
        None => {
            unsafe { set_abi_errno(libc::EBADF) };
            -1
        }
    }
}

// ---------------------------------------------------------------------------
// Flush / positioning
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub unsafe extern "C" fn my_fflush(stream: *mut MyFile) -> c_int {
    let Some(file) = (unsafe { handle(stream) }) else {
        unsafe { set_abi_errno(libc::EBADF) };
        return MY_EOF;
    };
    match file.stream().flush() {
        Ok(()) => 0,
        Err(err) => {
            unsafe { report(&err) };
            MY_EOF
        }
    }
}

/// Reposition the stream. Returns 0 on success, -1 on failure.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn my_fseek(stream: *mut MyFile, offset: c_long, whence: c_int) -> c_int {
    let Some(file) = (unsafe { handle(stream) }) else {
        unsafe { set_abi_errno(libc::EBADF) };
        return -1;
    };
    let Some(whence) = Whence::from_raw(whence) else {
        unsafe { set_abi_errno(libc::EINVAL) };
        return -1;
    };
    match file.stream().seek(i64::from(offset), whence) {
        Ok(_) => 0,
        Err(err) => {
            unsafe { report(&err) };
            -1
        }
    }
}

/// Logical stream position, or -1.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn my_ftell(stream: *mut MyFile) -> c_long {
    let Some(file) = (unsafe { handle(stream) }) else {
        unsafe { set_abi_errno(libc::EBADF) };
        return -1;
    };
    match file.stream().tell() {
        Ok(pos) => c_long::try_from(pos).unwrap_or_else(|_| {
            unsafe { set_abi_errno(libc::EOVERFLOW) };
            -1
        }),
        Err(err) => {
            unsafe { report(&err) };
            -1
        }
    }
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

/// Read up to `nmemb` elements of `size` bytes. Returns whole elements read.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn my_fread(
    ptr: *mut c_void,
    size: usize,
    nmemb: usize,
    stream: *mut MyFile,
) -> usize {
    let Some(file) = (unsafe { handle(stream) }) else {
        unsafe { set_abi_errno(libc::EBADF) };
        return 0;
    };
    let Some(len) = request_len(size, nmemb) else {
        unsafe { set_abi_errno(libc::EOVERFLOW) };
        return 0;
    };
    if len == 0 {
        return 0;
    }
    if ptr.is_null() {
        unsafe { set_abi_errno(libc::EFAULT) };
        return 0;
    }
    let dst = unsafe { std::slice::from_raw_parts_mut(ptr.cast::<u8>(), len) };
    let stream = file.stream();
    let n = stream.read(dst, size, nmemb);
    if let Some(errno) = stream.last_error().filter(|_| n < nmemb) {
        unsafe { set_abi_errno(errno) };
    }
    n
}

/// Write up to `nmemb` elements of `size` bytes. Returns whole elements written.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn my_fwrite(
    ptr: *const c_void,
    size: usize,
    nmemb: usize,
    stream: *mut MyFile,
) -> usize {
    let Some(file) = (unsafe { handle(stream) }) else {
        unsafe { set_abi_errno(libc::EBADF) };
        return 0;
    };
    let Some(len) = request_len(size, nmemb) else {
        unsafe { set_abi_errno(libc::EOVERFLOW) };
        return 0;
    };
    if len == 0 {
        return 0;
    }
    if ptr.is_null() {
        unsafe { set_abi_errno(libc::EFAULT) };
        return 0;
    }
    let src = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len) };
    let stream = file.stream();
    let n = stream.write(src, size, nmemb);
    if let Some(errno) = stream.last_error().filter(|_| n < nmemb) {
        unsafe { set_abi_errno(errno) };
    }
    n
}

/// Next byte as an unsigned char widened to int, or `MY_EOF`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn my_fgetc(stream: *mut MyFile) -> c_int {
    let Some(file) = (unsafe { handle(stream) }) else {
        unsafe { set_abi_errno(libc::EBADF) };
        return MY_EOF;
    };
    match file.stream().get_byte() {
        Some(byte) => c_int::from(byte),
        None => MY_EOF,
    }
}

/// Write `c` converted to unsigned char. Returns it, or `MY_EOF`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn my_fputc(c: c_int, stream: *mut MyFile) -> c_int {
    let Some(file) = (unsafe { handle(stream) }) else {
        unsafe { set_abi_errno(libc::EBADF) };
        return MY_EOF;
    };
    match file.stream().put_byte(c as u8) {
        Ok(byte) => c_int::from(byte),
        Err(err) => {
            unsafe { report(&err) };
            MY_EOF
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// 1 once end of input was reached, 0 otherwise.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn my_feof(stream: *mut MyFile) -> c_int {
    match unsafe { handle(stream) } {
        Some(file) => c_int::from(file.stream_ref().is_eof()),
        None => 0,
    }
}

/// The errno of the last failure, or 0 if the error indicator is clear.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn my_ferror(stream: *mut MyFile) -> c_int {
    match unsafe { handle(stream) } {
        Some(file) => file.stream_ref().last_error().unwrap_or(0),
        None => 0,
    }
}
