//! Stream error taxonomy.
//!
//! Every failure a stream can observe is reported through [`StreamError`].
//! Variants that originate in a system call carry the kernel errno so the C
//! boundary can hand it back unchanged.

use thiserror::Error;

/// Failure reported by a stream operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The open mode (or process pipe type) is not one of the accepted strings.
    #[error("unrecognized stream mode {mode:?}")]
    InvalidMode { mode: String },
    /// A buffer capacity of zero was requested.
    #[error("stream buffer capacity must be at least one byte")]
    InvalidCapacity,
    /// The fixed-size buffer could not be allocated.
    #[error("cannot allocate a {capacity}-byte stream buffer")]
    Allocation { capacity: usize },
    /// The path could not be opened.
    #[error("open failed (errno {errno})")]
    Open { errno: i32 },
    /// The communication pipe for a process stream could not be created.
    #[error("pipe creation failed (errno {errno})")]
    Pipe { errno: i32 },
    /// The child process could not be started.
    #[error("process spawn failed (errno {errno})")]
    Spawn { errno: i32 },
    /// Reading from the descriptor failed.
    #[error("read failed (errno {errno})")]
    Read { errno: i32 },
    /// Writing caller data to the stream failed.
    #[error("write failed (errno {errno})")]
    Write { errno: i32 },
    /// Committing buffered bytes to the descriptor failed.
    #[error("flush failed (errno {errno})")]
    Flush { errno: i32 },
    /// `flush` was requested while the buffer holds unread input.
    #[error("flush requested while the buffer holds unread input")]
    InvalidOperationOrder,
    /// Repositioning the descriptor failed.
    #[error("seek failed (errno {errno})")]
    Seek { errno: i32 },
    /// Closing the descriptor failed.
    #[error("close failed (errno {errno})")]
    Close { errno: i32 },
    /// Waiting for the child process failed.
    #[error("wait for child process failed (errno {errno})")]
    Wait { errno: i32 },
}

impl StreamError {
    /// errno value that best describes this failure.
    ///
    /// OS-originated variants return the kernel's errno; the others map to
    /// the value a conformant libc would report.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::InvalidMode { .. } | Self::InvalidCapacity => libc::EINVAL,
            Self::Allocation { .. } => libc::ENOMEM,
            Self::InvalidOperationOrder => libc::EBADF,
            Self::Open { errno }
            | Self::Pipe { errno }
            | Self::Spawn { errno }
            | Self::Read { errno }
            | Self::Write { errno }
            | Self::Flush { errno }
            | Self::Seek { errno }
            | Self::Close { errno }
            | Self::Wait { errno } => *errno,
        }
    }

    /// True for failures in the flush family, including the ordering violation.
    #[must_use]
    pub fn is_flush_failure(&self) -> bool {
        matches!(self, Self::Flush { .. } | Self::InvalidOperationOrder)
    }

    /// Whether the error came back from a system call.
    #[must_use]
    pub fn is_os_error(&self) -> bool {
        !matches!(
            self,
            Self::InvalidMode { .. }
                | Self::InvalidCapacity
                | Self::Allocation { .. }
                | Self::InvalidOperationOrder
        )
    }
}

impl From<StreamError> for std::io::Error {
    fn from(err: StreamError) -> Self {
        if err.is_os_error() {
            return std::io::Error::from_raw_os_error(err.errno());
        }
        let kind = match err {
            StreamError::Allocation { .. } => std::io::ErrorKind::OutOfMemory,
            _ => std::io::ErrorKind::InvalidInput,
        };
        std::io::Error::new(kind, err)
    }
}
