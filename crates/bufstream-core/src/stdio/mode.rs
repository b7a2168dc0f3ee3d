//! Open-mode parsing.
//!
//! Only the six classic mode strings are accepted; anything else is rejected
//! before any system call is made. Append modes are write-only (or
//! read-write for `a+`) with `O_APPEND | O_CREAT`.

use crate::error::StreamError;

/// Permission bits for files created by `w`, `w+`, `a` and `a+`.
pub const CREATE_PERMISSIONS: u32 = 0o644;

/// Parsed `fopen` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// `"r"`: read only.
    Read,
    /// `"r+"`: read and write, no truncation.
    ReadUpdate,
    /// `"w"`: write only, truncate or create.
    Write,
    /// `"w+"`: read and write, truncate or create.
    WriteUpdate,
    /// `"a"`: write only, append, create.
    Append,
    /// `"a+"`: read and write, append, create.
    AppendUpdate,
}

impl OpenMode {
    /// Parse a mode string.
    pub fn parse(mode: &str) -> Result<Self, StreamError> {
        match mode {
            "r" => Ok(Self::Read),
            "r+" => Ok(Self::ReadUpdate),
            "w" => Ok(Self::Write),
            "w+" => Ok(Self::WriteUpdate),
            "a" => Ok(Self::Append),
            "a+" => Ok(Self::AppendUpdate),
            _ => Err(StreamError::InvalidMode {
                mode: mode.to_owned(),
            }),
        }
    }

    /// `O_*` flags passed to `open(2)`.
    #[must_use]
    pub const fn oflags(self) -> i32 {
        match self {
            Self::Read => libc::O_RDONLY,
            Self::ReadUpdate => libc::O_RDWR,
            Self::Write => libc::O_WRONLY | libc::O_TRUNC | libc::O_CREAT,
            Self::WriteUpdate => libc::O_RDWR | libc::O_TRUNC | libc::O_CREAT,
            Self::Append => libc::O_WRONLY | libc::O_APPEND | libc::O_CREAT,
            Self::AppendUpdate => libc::O_RDWR | libc::O_APPEND | libc::O_CREAT,
        }
    }

    /// The canonical mode string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "r",
            Self::ReadUpdate => "r+",
            Self::Write => "w",
            Self::WriteUpdate => "w+",
            Self::Append => "a",
            Self::AppendUpdate => "a+",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_all_modes() {
        for s in ["r", "r+", "w", "w+", "a", "a+"] {
            assert_eq!(OpenMode::parse(s).unwrap().as_str(), s);
        }
    }

    #[test]
    fn parse_rejects_everything_else() {
        for s in ["", "rb", "x", "rw", "+", "R", "a++", "w+b", "r "] {
            assert_eq!(
                OpenMode::parse(s),
                Err(StreamError::InvalidMode { mode: s.to_owned() }),
                "mode {s:?} must be rejected"
            );
        }
    }

    #[test]
    fn read_only_flags() {
        assert_eq!(OpenMode::Read.oflags() & libc::O_ACCMODE, libc::O_RDONLY);
        assert_eq!(OpenMode::Read.oflags() & libc::O_CREAT, 0);
    }

    #[test]
    fn write_truncates_and_creates() {
        let o = OpenMode::Write.oflags();
        assert_eq!(o & libc::O_ACCMODE, libc::O_WRONLY);
        assert_ne!(o & libc::O_TRUNC, 0);
        assert_ne!(o & libc::O_CREAT, 0);
        assert_eq!(o & libc::O_APPEND, 0);
    }

    #[test]
    fn append_is_write_only_append_create() {
        let o = OpenMode::Append.oflags();
        assert_eq!(o & libc::O_ACCMODE, libc::O_WRONLY);
        assert_ne!(o & libc::O_APPEND, 0);
        assert_ne!(o & libc::O_CREAT, 0);
        assert_eq!(o & libc::O_TRUNC, 0);
    }

    #[test]
    fn update_modes_are_read_write() {
        for m in [OpenMode::ReadUpdate, OpenMode::WriteUpdate, OpenMode::AppendUpdate] {
            assert_eq!(m.oflags() & libc::O_ACCMODE, libc::O_RDWR);
        }
    }
}
