#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

//! Thread-safe bounded FIFO queue with non-blocking semantics.
//!
//! **Complexity**
//! - `try_push` and `try_pop` complete in `O(1)`.
//! - `close_and_drain` is `O(n)` where `n` is the number of buffered elements.
//!
//! **Thread Safety**
//! - All operations take `&self` and may be invoked concurrently by multiple
//!   producers and consumers, from sync or async code.
//! - No operation ever waits for space or for an element; the internal lock is
//!   held only for the duration of a `VecDeque` operation, so it is safe to
//!   call from inside an async task.
//!
//! **Semantics of `close()`**
//! - Closing the queue prevents new pushes, which hand the item back to the
//!   caller as [`TryPushError::Closed`].
//! - Pops keep draining buffered items after close.
//! - The operation is idempotent; repeated calls have no additional effect.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Error returned by [`BoundedQueue::try_push`] when the value cannot be queued
/// immediately.
#[derive(Debug, PartialEq, Eq)]
pub enum TryPushError<T> {
    /// The queue was at capacity; the item is returned to the caller.
    Full(T),
    /// The queue has been closed; the item is returned to the caller.
    Closed(T),
}

impl<T> TryPushError<T> {
    /// Returns the item that failed to be enqueued.
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            TryPushError::Full(item) | TryPushError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Display for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryPushError::Full(_) => f.write_str("bounded queue is full"),
            TryPushError::Closed(_) => f.write_str("bounded queue is closed"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TryPushError<T> {}

struct Inner<T> {
    queue: VecDeque<T>,
    capacity: usize,
    closed: bool,
}

/// Thread-safe bounded FIFO queue.
///
/// The length never exceeds the capacity given to [`BoundedQueue::new`]:
/// a push against a full queue fails immediately and returns the item.
///
/// ```
/// use channelog_common::collections::{BoundedQueue, TryPushError};
///
/// let queue = BoundedQueue::new(2);
/// queue.try_push("a").unwrap();
/// queue.try_push("b").unwrap();
/// assert_eq!(queue.try_push("c"), Err(TryPushError::Full("c")));
///
/// let drained = queue.close_and_drain();
/// assert_eq!(drained, vec!["a", "b"]);
/// assert_eq!(queue.try_push("d"), Err(TryPushError::Closed("d")));
/// ```
pub struct BoundedQueue<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.lock();
        f.debug_struct("BoundedQueue")
            .field("len", &guard.queue.len())
            .field("capacity", &guard.capacity)
            .field("closed", &guard.closed)
            .finish()
    }
}

impl<T> BoundedQueue<T> {
    /// Creates a new queue with the provided capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BoundedQueue capacity must be greater than zero");
        Self {
            inner: Arc::new(Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                capacity,
                closed: false,
            })),
        }
    }

    /// Returns the maximum number of elements that can be stored.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Returns the current element count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Returns `true` when the queue has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` when the queue is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        let guard = self.inner.lock();
        guard.queue.len() >= guard.capacity
    }

    /// Marks the queue as closed. Buffered items stay poppable.
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    /// Returns `true` if [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Closes the queue and removes every buffered element in one step.
    ///
    /// No push can slip in between the close and the drain.
    pub fn close_and_drain(&self) -> Vec<T> {
        let mut guard = self.inner.lock();
        guard.closed = true;
        guard.queue.drain(..).collect()
    }

    /// Attempts to push an element without blocking.
    pub fn try_push(&self, item: T) -> Result<(), TryPushError<T>> {
        let mut guard = self.inner.lock();
        if guard.closed {
            return Err(TryPushError::Closed(item));
        }
        if guard.queue.len() >= guard.capacity {
            return Err(TryPushError::Full(item));
        }
        guard.queue.push_back(item);
        Ok(())
    }

    /// Attempts to pop an element without blocking.
    #[must_use]
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().queue.pop_front()
    }
}
