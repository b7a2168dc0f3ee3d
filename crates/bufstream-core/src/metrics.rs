//! Atomic counters for stream observability.
//!
//! All counters use relaxed ordering; they are diagnostic, not
//! synchronization primitives.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide stream operation counters.
#[derive(Debug)]
pub struct StreamMetrics {
    /// Streams successfully opened (files and process pipes).
    pub opens: AtomicU64,
    /// Streams closed, explicitly or on drop.
    pub closes: AtomicU64,
    /// Buffer refills issued against a descriptor.
    pub refills: AtomicU64,
    /// Reads that bypassed the buffer and landed in caller memory.
    pub direct_reads: AtomicU64,
    /// Successful flushes that committed at least one byte.
    pub flushes: AtomicU64,
    /// Bytes obtained from descriptors.
    pub bytes_read: AtomicU64,
    /// Bytes committed to descriptors.
    pub bytes_written: AtomicU64,
    /// Operations that set a stream's error indicator.
    pub errors: AtomicU64,
    /// Child processes spawned.
    pub spawns: AtomicU64,
    /// Child processes reaped.
    pub reaps: AtomicU64,
}

impl StreamMetrics {
    /// Create a new zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            opens: AtomicU64::new(0),
            closes: AtomicU64::new(0),
            refills: AtomicU64::new(0),
            direct_reads: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            spawns: AtomicU64::new(0),
            reaps: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` to a counter.
    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Snapshot all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            opens: Self::get(&self.opens),
            closes: Self::get(&self.closes),
            refills: Self::get(&self.refills),
            direct_reads: Self::get(&self.direct_reads),
            flushes: Self::get(&self.flushes),
            bytes_read: Self::get(&self.bytes_read),
            bytes_written: Self::get(&self.bytes_written),
            errors: Self::get(&self.errors),
            spawns: Self::get(&self.spawns),
            reaps: Self::get(&self.reaps),
        }
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of all stream counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub opens: u64,
    pub closes: u64,
    pub refills: u64,
    pub direct_reads: u64,
    pub flushes: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub errors: u64,
    pub spawns: u64,
    pub reaps: u64,
}

static GLOBAL_METRICS: StreamMetrics = StreamMetrics::new();

/// Global metrics instance shared by every stream in the process.
#[must_use]
pub fn global_metrics() -> &'static StreamMetrics {
    &GLOBAL_METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_metrics_are_zero() {
        let m = StreamMetrics::new();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn inc_and_add() {
        let m = StreamMetrics::new();
        StreamMetrics::inc(&m.refills);
        StreamMetrics::inc(&m.refills);
        StreamMetrics::add(&m.bytes_read, 4096);
        let snap = m.snapshot();
        assert_eq!(snap.refills, 2);
        assert_eq!(snap.bytes_read, 4096);
        assert_eq!(snap.flushes, 0);
    }

    #[test]
    fn global_is_shared() {
        let before = StreamMetrics::get(&global_metrics().reaps);
        StreamMetrics::inc(&global_metrics().reaps);
        assert!(StreamMetrics::get(&global_metrics().reaps) > before);
    }
}
