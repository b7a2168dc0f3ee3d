//! Decoding of raw `waitpid` status words (glibc bit layout).

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

const fn wifexited(status: i32) -> bool {
    (status & 0x7f) == 0
}

const fn wexitstatus(status: i32) -> i32 {
    (status >> 8) & 0xff
}

const fn wifsignaled(status: i32) -> bool {
    let low7 = status & 0x7f;
    low7 != 0 && low7 != 0x7f
}

const fn wtermsig(status: i32) -> i32 {
    status & 0x7f
}

const fn wifstopped(status: i32) -> bool {
    (status & 0xff) == 0x7f
}

/// Termination status of a reaped child, exactly as `waitpid` reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaitStatus(i32);

impl WaitStatus {
    #[must_use]
    pub const fn from_raw(status: i32) -> Self {
        Self(status)
    }

    /// The undecoded status word, as `pclose` returns it.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// True if the child called `exit` or returned from `main`.
    #[must_use]
    pub const fn exited(self) -> bool {
        wifexited(self.0)
    }

    /// Exit code of a normally terminated child.
    #[must_use]
    pub const fn exit_code(self) -> Option<i32> {
        if wifexited(self.0) {
            Some(wexitstatus(self.0))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn signaled(self) -> bool {
        wifsignaled(self.0)
    }

    /// Signal that killed the child.
    #[must_use]
    pub const fn term_signal(self) -> Option<i32> {
        if wifsignaled(self.0) {
            Some(wtermsig(self.0))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn stopped(self) -> bool {
        wifstopped(self.0)
    }

    /// Exited with code 0.
    #[must_use]
    pub const fn success(self) -> bool {
        self.0 == 0
    }
}

impl From<ExitStatus> for WaitStatus {
    fn from(status: ExitStatus) -> Self {
        Self(status.into_raw())
    }
}

impl fmt::Display for WaitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.exit_code(), self.term_signal()) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(sig)) => write!(f, "killed by signal {sig}"),
            _ => write!(f, "wait status {:#x}", self.0),
        }
    }
}
