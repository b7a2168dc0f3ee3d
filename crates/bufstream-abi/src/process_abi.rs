//! ABI layer for `my_popen` / `my_pclose`.

use std::ffi::{OsStr, c_char, c_int};
use std::os::unix::ffi::OsStrExt;

use bufstream_core::ProcessStream;

use crate::stdio_abi::{MyFile, c_str_arg, into_handle, report, set_abi_errno};

/// Run `command` through `sh -c` and connect a stream to its stdout
/// (`type` `"r"`) or stdin (`type` `"w"`).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn my_popen(command: *const c_char, type_: *const c_char) -> *mut MyFile {
    let (Some(command), Some(kind)) = (unsafe { c_str_arg(command) }, unsafe { c_str_arg(type_) })
    else {
        unsafe { set_abi_errno(libc::EINVAL) };
        return std::ptr::null_mut();
    };
    let command = OsStr::from_bytes(command.to_bytes());
    match ProcessStream::open(command, kind.to_str().unwrap_or("")) {
        Ok(p) => into_handle(MyFile::Process(p)),
        Err(err) => {
            unsafe { report(&err) };
            std::ptr::null_mut()
        }
    }
}

/// Flush, close the pipe, wait for the child and free the handle.
///
/// Returns the raw wait status, or -1. A file handle is still closed and
/// freed, but the call reports failure.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn my_pclose(stream: *mut MyFile) -> c_int {
    if stream.is_null() {
        unsafe { set_abi_errno(libc::EBADF) };
        return -1;
    }
    let file = unsafe { Box::from_raw(stream) };
    match *file {
        MyFile::Process(p) => match p.close() {
            Ok(status) => status.raw(),
            Err(err) => {
                unsafe { report(&err) };
                -1
            }
        },
        MyFile::File(s) => {
            let _ = s.close();
            unsafe { set_abi_errno(libc::ECHILD) };
            -1
        }
    }
}
