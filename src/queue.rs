use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::trace;

use crate::vospi::{Frame, TelemetryMode};
use crate::{Error, Result};

struct Inner {
    slots: Vec<Frame>,
    /// Slot holding the oldest unread frame.
    head: usize,
    len: usize,
    dropped: u64,
    closed: bool,
}

/// Fixed-capacity hand-off of frames from a producer to consumers.
///
/// All frame storage is allocated up front and frames are copied in and out, so steady
/// state operation does not allocate. The producer never blocks: when the queue is full the
/// oldest unread frame is overwritten. Frames are copied under the lock, so a consumer
/// never observes a partially written frame.
pub struct FrameQueue {
    inner: Mutex<Inner>,
    ready: Condvar,
    capacity: usize,
}

impl FrameQueue {
    /// # Panics
    /// If `capacity` is 0.
    #[must_use]
    pub fn new(capacity: usize, mode: TelemetryMode) -> Self {
        assert!(capacity > 0, "frame queue capacity must be non-zero");
        FrameQueue {
            inner: Mutex::new(Inner {
                slots: (0..capacity).map(|_| Frame::new(mode)).collect(),
                head: 0,
                len: 0,
                dropped: 0,
                closed: false,
            }),
            ready: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of unread frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unread frames overwritten because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Copy `frame` into the queue, overwriting the oldest unread frame if full.
    ///
    /// Returns `true` if a frame was dropped to make room.
    ///
    /// # Errors
    /// [Error::QueueClosed] if the queue was closed.
    pub fn push(&self, frame: &Frame) -> Result<bool> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(Error::QueueClosed);
        }
        let dropped = inner.len == self.capacity;
        if dropped {
            inner.head = (inner.head + 1) % self.capacity;
            inner.len -= 1;
            inner.dropped += 1;
            trace!(dropped = inner.dropped, "queue full, dropped oldest frame");
        }
        let tail = (inner.head + inner.len) % self.capacity;
        inner.slots[tail].copy_from(frame);
        inner.len += 1;
        drop(inner);

        self.ready.notify_one();
        Ok(dropped)
    }

    /// Copy `frame` into the queue only if there is room.
    ///
    /// Returns `false` if the queue is full.
    ///
    /// # Errors
    /// [Error::QueueClosed] if the queue was closed.
    pub fn try_push(&self, frame: &Frame) -> Result<bool> {
        {
            let inner = self.lock();
            if inner.closed {
                return Err(Error::QueueClosed);
            }
            if inner.len == self.capacity {
                return Ok(false);
            }
        }
        self.push(frame).map(|_| true)
    }

    fn take(&self, inner: &mut Inner, out: &mut Frame) {
        let head = inner.head;
        out.copy_from(&inner.slots[head]);
        inner.head = (head + 1) % self.capacity;
        inner.len -= 1;
    }

    /// Copy the oldest unread frame into `out`, blocking until one is available.
    ///
    /// # Errors
    /// [Error::QueueClosed] once the queue is closed and drained.
    pub fn pop(&self, out: &mut Frame) -> Result<()> {
        let inner = self.lock();
        let mut inner = self
            .ready
            .wait_while(inner, |q| q.len == 0 && !q.closed)
            .unwrap_or_else(PoisonError::into_inner);
        if inner.len == 0 {
            return Err(Error::QueueClosed);
        }
        self.take(&mut inner, out);
        Ok(())
    }

    /// As [FrameQueue::pop], giving up after `timeout`.
    ///
    /// Returns `false` on timeout.
    ///
    /// # Errors
    /// [Error::QueueClosed] once the queue is closed and drained.
    pub fn pop_timeout(&self, out: &mut Frame, timeout: Duration) -> Result<bool> {
        let inner = self.lock();
        let (mut inner, _) = self
            .ready
            .wait_timeout_while(inner, timeout, |q| q.len == 0 && !q.closed)
            .unwrap_or_else(PoisonError::into_inner);
        if inner.len == 0 {
            if inner.closed {
                return Err(Error::QueueClosed);
            }
            return Ok(false);
        }
        self.take(&mut inner, out);
        Ok(true)
    }

    /// Copy the oldest unread frame into `out` if there is one.
    ///
    /// # Errors
    /// [Error::QueueClosed] once the queue is closed and drained.
    pub fn try_pop(&self, out: &mut Frame) -> Result<bool> {
        let mut inner = self.lock();
        if inner.len == 0 {
            if inner.closed {
                return Err(Error::QueueClosed);
            }
            return Ok(false);
        }
        self.take(&mut inner, out);
        Ok(true)
    }

    /// Stop accepting frames and wake all waiting consumers. Unread frames can still be
    /// popped.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }
}
