//! Stream configuration.
//!
//! The buffer capacity is the only tunable. The process-wide default comes
//! from the `BUFSTREAM_BUFSIZE` environment variable:
//! - unset, empty, zero or unparsable: [`DEFAULT_BUFFER_SIZE`] (4096).
//! - otherwise the given byte count, clamped to [`MAX_BUFFER_SIZE`].
//!
//! Individual streams can override it through [`StreamConfig::with_capacity`],
//! which is how tests exercise the engine with tiny buffers.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::StreamError;

/// Default buffer capacity, one common memory page.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Upper bound accepted from the environment.
pub const MAX_BUFFER_SIZE: usize = 64 << 20;

/// Environment variable consulted by [`default_capacity`].
pub const BUFSIZE_ENV: &str = "BUFSTREAM_BUFSIZE";

// 0 = unresolved; any other value is the resolved capacity.
static CACHED_CAPACITY: AtomicUsize = AtomicUsize::new(0);

fn parse_capacity(raw: &str) -> Option<usize> {
    match raw.trim().parse::<usize>() {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(n.min(MAX_BUFFER_SIZE)),
    }
}

/// Process-wide default capacity (reads the environment on first call, caches thereafter).
#[must_use]
pub fn default_capacity() -> usize {
    let cached = CACHED_CAPACITY.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }
    let resolved = std::env::var(BUFSIZE_ENV)
        .ok()
        .and_then(|v| parse_capacity(&v))
        .unwrap_or(DEFAULT_BUFFER_SIZE);
    // Racing resolvers all read the same environment, so last store wins harmlessly.
    CACHED_CAPACITY.store(resolved, Ordering::Relaxed);
    resolved
}

/// Construction-time parameters for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    capacity: usize,
}

impl StreamConfig {
    /// Configuration with an explicit buffer capacity.
    pub fn with_capacity(capacity: usize) -> Result<Self, StreamError> {
        if capacity == 0 {
            return Err(StreamError::InvalidCapacity);
        }
        Ok(Self { capacity })
    }

    /// Buffer capacity in bytes (always at least 1).
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}
