//! Fixed-capacity stream buffer.
//!
//! The buffer holds either unread input or unflushed output, never both.
//! Which one is tracked by [`BufferState`], so the cursor arithmetic for each
//! direction only exists where it is meaningful.
//!
//! Invariants:
//! - `cursor <= end <= capacity` while reading.
//! - `end <= capacity` while writing; pending output is always `[0, end)`.
//! - capacity is fixed at creation and never changes.

use crate::error::StreamError;

/// What the buffer currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferState {
    /// No operation since open, or the last flush/seek emptied the buffer.
    #[default]
    Idle,
    /// `[cursor, end)` are bytes fetched from the descriptor but not yet consumed.
    Reading { cursor: usize, end: usize },
    /// `[0, end)` are bytes accepted from the caller but not yet committed.
    Writing { end: usize },
}

/// One stream's byte buffer plus its role.
#[derive(Debug)]
pub struct StreamBuffer {
    data: Box<[u8]>,
    state: BufferState,
}

impl StreamBuffer {
    /// Allocate a buffer of exactly `capacity` bytes.
    ///
    /// Allocation failure is reported instead of aborting the process.
    pub fn new(capacity: usize) -> Result<Self, StreamError> {
        if capacity == 0 {
            return Err(StreamError::InvalidCapacity);
        }
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| StreamError::Allocation { capacity })?;
        data.resize(capacity, 0);
        Ok(Self {
            data: data.into_boxed_slice(),
            state: BufferState::Idle,
        })
    }

    /// Buffer capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Forget the contents without committing anything.
    pub fn reset(&mut self) {
        self.state = BufferState::Idle;
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    /// Mark the buffer as a read buffer. Only valid from `Idle`.
    pub fn enter_reading(&mut self) {
        if self.state == BufferState::Idle {
            self.state = BufferState::Reading { cursor: 0, end: 0 };
        }
    }

    /// Bytes fetched but not yet handed to the caller.
    #[must_use]
    pub fn unread(&self) -> usize {
        match self.state {
            BufferState::Reading { cursor, end } => end - cursor,
            _ => 0,
        }
    }

    /// Copy unread bytes into `dst`, advancing the cursor. Returns the count.
    pub fn copy_out(&mut self, dst: &mut [u8]) -> usize {
        let BufferState::Reading { cursor, end } = self.state else {
            return 0;
        };
        let take = dst.len().min(end - cursor);
        dst[..take].copy_from_slice(&self.data[cursor..cursor + take]);
        self.state = BufferState::Reading {
            cursor: cursor + take,
            end,
        };
        take
    }

    /// Consume one unread byte.
    pub fn next_byte(&mut self) -> Option<u8> {
        match self.state {
            BufferState::Reading { cursor, end } if cursor < end => {
                self.state = BufferState::Reading {
                    cursor: cursor + 1,
                    end,
                };
                Some(self.data[cursor])
            }
            _ => None,
        }
    }

    /// Whole buffer as a destination for a descriptor read.
    ///
    /// Stale bytes are left in place; [`set_filled`](Self::set_filled)
    /// bounds what is visible afterwards.
    pub fn fill_slot(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Record that the first `n` bytes were just filled from the descriptor.
    pub fn set_filled(&mut self, n: usize) {
        debug_assert!(n <= self.data.len());
        self.state = BufferState::Reading {
            cursor: 0,
            end: n.min(self.data.len()),
        };
    }

    // -----------------------------------------------------------------------
    // Write side
    // -----------------------------------------------------------------------

    /// Mark the buffer as a write buffer. Only valid from `Idle`.
    pub fn enter_writing(&mut self) {
        if self.state == BufferState::Idle {
            self.state = BufferState::Writing { end: 0 };
        }
    }

    /// Bytes accepted but not yet committed.
    #[must_use]
    pub fn unflushed(&self) -> usize {
        match self.state {
            BufferState::Writing { end } => end,
            _ => 0,
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.unflushed() == self.data.len()
    }

    /// Copy as much of `src` as fits after the pending output. Returns the count.
    pub fn copy_in(&mut self, src: &[u8]) -> usize {
        let BufferState::Writing { end } = self.state else {
            return 0;
        };
        let take = src.len().min(self.data.len() - end);
        self.data[end..end + take].copy_from_slice(&src[..take]);
        self.state = BufferState::Writing { end: end + take };
        take
    }

    /// Append one byte. Returns `false` when the buffer is full.
    pub fn push_byte(&mut self, byte: u8) -> bool {
        match self.state {
            BufferState::Writing { end } if end < self.data.len() => {
                self.data[end] = byte;
                self.state = BufferState::Writing { end: end + 1 };
                true
            }
            _ => false,
        }
    }

    /// Output waiting to be committed.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.data[..self.unflushed()]
    }

    /// Drop the first `n` pending bytes after they were committed.
    ///
    /// Whatever remains is shifted to the front; an empty buffer becomes `Idle`.
    pub fn consume_flushed(&mut self, n: usize) {
        let BufferState::Writing { end } = self.state else {
            return;
        };
        let n = n.min(end);
        if n == end {
            self.state = BufferState::Idle;
        } else {
            self.data.copy_within(n..end, 0);
            self.state = BufferState::Writing { end: end - n };
        }
    }

    // -----------------------------------------------------------------------
    // Position
    // -----------------------------------------------------------------------

    /// Offset between the logical stream position and the descriptor position.
    ///
    /// At most one of the two terms is non-zero.
    #[must_use]
    pub fn position_delta(&self) -> i64 {
        self.unflushed() as i64 - self.unread() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariant(buf: &StreamBuffer) {
        match buf.state() {
            BufferState::Idle => {}
            BufferState::Reading { cursor, end } => {
                assert!(cursor <= end && end <= buf.capacity());
            }
            BufferState::Writing { end } => assert!(end <= buf.capacity()),
        }
    }

    #[test]
    fn zero_capacity_rejected() {
        assert_eq!(
            StreamBuffer::new(0).unwrap_err(),
            StreamError::InvalidCapacity
        );
    }

    #[test]
    fn absurd_capacity_is_an_allocation_failure() {
        let err = StreamBuffer::new(usize::MAX).unwrap_err();
        assert_eq!(err, StreamError::Allocation { capacity: usize::MAX });
    }

    #[test]
    fn new_buffer_is_idle() {
        let buf = StreamBuffer::new(4).unwrap();
        assert_eq!(buf.state(), BufferState::Idle);
        assert_eq!(buf.capacity(), 4);
        assert_eq!(buf.position_delta(), 0);
    }

    #[test]
    fn fill_then_copy_out() {
        let mut buf = StreamBuffer::new(4).unwrap();
        buf.enter_reading();
        buf.fill_slot()[..3].copy_from_slice(b"abc");
        buf.set_filled(3);
        assert_eq!(buf.unread(), 3);
        assert_eq!(buf.position_delta(), -3);

        let mut dst = [0u8; 2];
        assert_eq!(buf.copy_out(&mut dst), 2);
        assert_eq!(&dst, b"ab");
        assert_eq!(buf.next_byte(), Some(b'c'));
        assert_eq!(buf.next_byte(), None);
        assert_eq!(buf.state(), BufferState::Reading { cursor: 3, end: 3 });
        assert_invariant(&buf);
    }

    #[test]
    fn copy_in_stops_at_capacity() {
        let mut buf = StreamBuffer::new(4).unwrap();
        buf.enter_writing();
        assert_eq!(buf.copy_in(b"hello"), 4);
        assert!(buf.is_full());
        assert!(!buf.push_byte(b'!'));
        assert_eq!(buf.pending(), b"hell");
        assert_eq!(buf.position_delta(), 4);
        assert_invariant(&buf);
    }

    #[test]
    fn partial_commit_keeps_the_tail() {
        let mut buf = StreamBuffer::new(8).unwrap();
        buf.enter_writing();
        buf.copy_in(b"abcdef");
        buf.consume_flushed(4);
        assert_eq!(buf.pending(), b"ef");
        buf.consume_flushed(2);
        assert_eq!(buf.state(), BufferState::Idle);
    }

    #[test]
    fn roles_do_not_mix() {
        let mut buf = StreamBuffer::new(4).unwrap();
        buf.enter_writing();
        buf.push_byte(b'x');
        buf.enter_reading();
        assert_eq!(buf.state(), BufferState::Writing { end: 1 });
        assert_eq!(buf.unread(), 0);
        assert_eq!(buf.copy_out(&mut [0u8; 1]), 0);

        buf.reset();
        buf.enter_reading();
        assert_eq!(buf.copy_in(b"y"), 0);
        assert!(!buf.push_byte(b'y'));
        assert_eq!(buf.unflushed(), 0);
    }
}
