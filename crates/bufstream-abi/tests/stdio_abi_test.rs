use std::ffi::{CString, c_int};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bufstream_abi::process_abi::{my_pclose, my_popen};
use bufstream_abi::stdio_abi::*;

static TEST_SEQ: AtomicU64 = AtomicU64::new(0);

fn temp_path(prefix: &str) -> PathBuf {
    let seq = TEST_SEQ.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "bufstream-abi-{prefix}-{}-{seq}.txt",
        std::process::id()
    ))
}

fn c_path(path: &Path) -> CString {
    CString::new(path.to_str().expect("temp path should be UTF-8")).unwrap()
}

fn errno() -> c_int {
    unsafe { *libc::__errno_location() }
}

#[test]
fn write_then_read_back() {
    let path = temp_path("rw");
    let cpath = c_path(&path);
    let payload = b"hello, buffered world\n";

    unsafe {
        let f = my_fopen(cpath.as_ptr(), c"w".as_ptr());
        assert!(!f.is_null());
        assert!(my_fileno(f) >= 0);
        assert_eq!(my_fwrite(payload.as_ptr().cast(), 1, payload.len(), f), payload.len());
        assert_eq!(my_ftell(f), payload.len() as std::ffi::c_long);
        assert_eq!(my_fclose(f), 0);
    }
    assert_eq!(fs::read(&path).unwrap(), payload);

    unsafe {
        let f = my_fopen(cpath.as_ptr(), c"r".as_ptr());
        assert!(!f.is_null());
        let mut buf = [0u8; 64];
        let n = my_fread(buf.as_mut_ptr().cast(), 1, buf.len(), f);
        assert_eq!(&buf[..n], payload);
        assert_eq!(my_feof(f), 1);
        assert_eq!(my_ferror(f), 0);
        assert_eq!(my_fgetc(f), MY_EOF);
        assert_eq!(my_fclose(f), 0);
    }
    let _ = fs::remove_file(&path);
}

#[test]
fn seek_tell_and_character_io() {
    let path = temp_path("chars");
    fs::write(&path, b"abcdef").unwrap();
    let cpath = c_path(&path);

    unsafe {
        let f = my_fopen(cpath.as_ptr(), c"r+".as_ptr());
        assert!(!f.is_null());
        assert_eq!(my_fgetc(f), b'a' as c_int);
        assert_eq!(my_ftell(f), 1);
        assert_eq!(my_fflush(f), MY_EOF);

        assert_eq!(my_fseek(f, 2, MY_SEEK_CUR), 0);
        assert_eq!(my_fgetc(f), b'd' as c_int);
        assert_eq!(my_fseek(f, -1, MY_SEEK_END), 0);
        assert_eq!(my_fgetc(f), b'f' as c_int);
        assert_eq!(my_fgetc(f), MY_EOF);
        assert_eq!(my_feof(f), 1);

        assert_eq!(my_fseek(f, 0, MY_SEEK_SET), 0);
        assert_eq!(my_feof(f), 0);
        assert_eq!(my_fputc(b'Z' as c_int, f), b'Z' as c_int);
        assert_eq!(my_fflush(f), 0);
        assert_eq!(my_fseek(f, 0, 42), -1);
        assert_eq!(errno(), libc::EINVAL);
        assert_eq!(my_fclose(f), 0);
    }
    assert_eq!(fs::read(&path).unwrap(), b"Zbcdef");
    let _ = fs::remove_file(&path);
}

#[test]
fn partial_element_read() {
    let path = temp_path("elements");
    fs::write(&path, [7u8; 10]).unwrap();
    let cpath = c_path(&path);
    unsafe {
        let f = my_fopen(cpath.as_ptr(), c"r".as_ptr());
        let mut buf = [0u32; 3];
        assert_eq!(my_fread(buf.as_mut_ptr().cast(), 4, 3, f), 2);
        assert_eq!(my_fclose(f), 0);
    }
    let _ = fs::remove_file(&path);
}

#[test]
fn fopen_failures_set_errno() {
    let missing = temp_path("missing");
    let cpath = c_path(&missing);
    unsafe {
        assert!(my_fopen(cpath.as_ptr(), c"r".as_ptr()).is_null());
        assert_eq!(errno(), libc::ENOENT);
        assert!(my_fopen(cpath.as_ptr(), c"rw".as_ptr()).is_null());
        assert_eq!(errno(), libc::EINVAL);
    }
    assert!(!missing.exists());
}

#[test]
fn popen_read_and_status() {
    unsafe {
        let p = my_popen(c"echo hello".as_ptr(), c"r".as_ptr());
        assert!(!p.is_null());
        let mut buf = [0u8; 16];
        let n = my_fread(buf.as_mut_ptr().cast(), 1, buf.len(), p);
        assert_eq!(&buf[..n], b"hello\n");
        assert_eq!(my_pclose(p), 0);

        let p = my_popen(c"exit 3".as_ptr(), c"r".as_ptr());
        assert!(!p.is_null());
        let status = my_pclose(p);
        assert!(libc::WIFEXITED(status));
        assert_eq!(libc::WEXITSTATUS(status), 3);
    }
}

#[test]
fn popen_write_to_cat() {
    let out = temp_path("cat");
    let command = CString::new(format!("cat > '{}'", out.display())).unwrap();
    unsafe {
        let p = my_popen(command.as_ptr(), c"w".as_ptr());
        assert!(!p.is_null());
        for &b in b"piped" {
            assert_eq!(my_fputc(c_int::from(b), p), c_int::from(b));
        }
        assert_eq!(my_pclose(p), 0);
    }
    assert_eq!(fs::read(&out).unwrap(), b"piped");
    let _ = fs::remove_file(&out);
}

#[test]
fn popen_rejects_bad_type() {
    unsafe {
        assert!(my_popen(c"true".as_ptr(), c"rw".as_ptr()).is_null());
        assert_eq!(errno(), libc::EINVAL);
    }
}

#[test]
fn closing_with_the_wrong_function_still_releases() {
    let path = temp_path("cross");
    let cpath = c_path(&path);
    unsafe {
        let f = my_fopen(cpath.as_ptr(), c"w".as_ptr());
        assert_eq!(my_fputc(b'x' as c_int, f), b'x' as c_int);
        assert_eq!(my_pclose(f), -1);

        let p = my_popen(c"true".as_ptr(), c"r".as_ptr());
        assert_eq!(my_fclose(p), MY_EOF);
    }
    // The file stream was still flushed on its way out.
    assert_eq!(fs::read(&path).unwrap(), b"x");
    let _ = fs::remove_file(&path);
}

#[test]
fn popen_accepts_non_utf8_commands() {
    let command = CString::new(&b"echo ok # \xff"[..]).unwrap();
    unsafe {
        let p = my_popen(command.as_ptr(), c"r".as_ptr());
        assert!(!p.is_null());
        let mut buf = [0u8; 8];
        let n = my_fread(buf.as_mut_ptr().cast(), 1, buf.len(), p);
        assert_eq!(&buf[..n], b"ok\n");
        assert_eq!(my_pclose(p), 0);
    }
}
