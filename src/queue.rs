//! Bounded, closeable blocking queue for in-process hand-off.
//!
//! A mutex-and-condvar monitor: a producing role pushes, a consuming role
//! pops, and a fixed capacity applies backpressure to the producing side
//! instead of letting the buffer grow without bound.
//!
//! # Overview
//!
//! - [`BoundedQueue::push`] - blocks while the queue is full and open
//! - [`BoundedQueue::pop`] - blocks while the queue is empty and open
//! - [`BoundedQueue::close`] - marks the end of the stream: buffered items
//!   stay poppable, then `pop` reports the terminal condition
//!
//! Two condition variables back the two distinct wait predicates: pushers
//! wait for "not full", poppers wait for "not empty, or closed". Each wait
//! sits in a `while !predicate` loop (spurious-wakeup safe), and `close`
//! broadcasts on both condvars so every parked thread re-checks its
//! predicate - a parked popper observes the terminal condition, a parked
//! pusher observes the fail-fast contract.
//!
//! The monitor is written for one producer and one consumer but stays
//! correct for several of each: full/empty checks and their mutation
//! happen atomically under the one lock, and close wakes everyone.
//!
//! # Example
//!
//! ```
//! use conveyor::queue::BoundedQueue;
//!
//! let queue = BoundedQueue::new(4);
//!
//! queue.push(1).unwrap();
//! queue.push(2).unwrap();
//! queue.close();
//!
//! assert_eq!(queue.pop(), Some(1));
//! assert_eq!(queue.pop(), Some(2));
//! assert_eq!(queue.pop(), None); // closed and drained
//! ```

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use minstant::Instant;
use thiserror::Error;

/// Timeout specification for blocking operations.
#[derive(Debug, Clone, Copy)]
pub enum Timeout {
    /// Wait indefinitely.
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

impl Timeout {
    fn deadline(self) -> Option<Instant> {
        match self {
            Self::Infinite => None,
            Self::Duration(d) => Some(Instant::now() + d),
        }
    }
}

/// Error returned by push operations.
///
/// Both variants hand the rejected item back so the caller can recover or
/// retry it; nothing is silently dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError<T> {
    /// The queue was closed; no push will ever succeed again.
    #[error("push on a closed queue")]
    Closed(T),
    /// The wait for a free slot expired; queue state is unchanged.
    #[error("push timed out with the queue full")]
    TimedOut(T),
}

impl<T> PushError<T> {
    /// Returns the item that was not enqueued.
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(item) | Self::TimedOut(item) => item,
        }
    }
}

/// Error returned by [`BoundedQueue::pop_timeout`] when the wait expires
/// before an item arrives or the queue closes.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("pop timed out with the queue empty")]
pub struct PopTimedOut;

/// State guarded by the queue mutex.
///
/// The sequence and the closed flag are only ever observed or mutated
/// together, under the one lock.
struct Shared<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Capacity-bounded, closeable FIFO hand-off between threads.
///
/// Items come out in exactly the order they went in, `len()` never exceeds
/// the capacity, and `closed && empty` is the unique terminal signal.
pub struct BoundedQueue<T> {
    shared: Mutex<Shared<T>>,
    /// Pushers park here; signaled when a slot frees up or the queue closes.
    not_full: Condvar,
    /// Poppers park here; signaled when an item arrives or the queue closes.
    not_empty: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Creates an empty, open queue.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be greater than 0");
        Self {
            shared: Mutex::new(Shared {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    /// Maximum number of buffered items.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Returns `true` if no items are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    // Queue critical sections contain no user code and cannot panic, so a
    // poisoned lock still holds consistent state; recover the guard.
    fn lock(&self) -> MutexGuard<'_, Shared<T>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an item, waiting as long as the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] with the item if the queue is closed,
    /// including when the close lands while this call is parked waiting for
    /// a slot.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        self.push_timeout(item, Timeout::Infinite)
    }

    /// Appends an item, waiting at most `timeout` for a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] if the queue is closed, or
    /// [`PushError::TimedOut`] if the wait expires. Both hand the item back
    /// un-enqueued and leave the queue unchanged.
    pub fn push_timeout(&self, item: T, timeout: Timeout) -> Result<(), PushError<T>> {
        let deadline = timeout.deadline();
        let mut shared = self.lock();
        loop {
            if shared.closed {
                return Err(PushError::Closed(item));
            }
            if shared.items.len() < self.capacity {
                break;
            }
            shared = match self.wait(&self.not_full, shared, deadline) {
                Some(guard) => guard,
                None => return Err(PushError::TimedOut(item)),
            };
        }
        shared.items.push_back(item);
        // One new item unparks at most one popper.
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the head item, waiting as long as the queue is empty and open.
    ///
    /// Returns `None` only at the terminal condition: the queue is closed
    /// and every buffered item has been drained.
    #[must_use]
    pub fn pop(&self) -> Option<T> {
        match self.pop_timeout(Timeout::Infinite) {
            Ok(item) => item,
            Err(PopTimedOut) => unreachable!("infinite wait cannot time out"),
        }
    }

    /// Removes the head item, waiting at most `timeout`.
    ///
    /// `Ok(None)` is the terminal condition (closed and drained), which is
    /// distinct from the wait expiring.
    ///
    /// # Errors
    ///
    /// Returns [`PopTimedOut`] if the wait expires with the queue still
    /// empty and open; queue state is unchanged.
    pub fn pop_timeout(&self, timeout: Timeout) -> Result<Option<T>, PopTimedOut> {
        let deadline = timeout.deadline();
        let mut shared = self.lock();
        loop {
            if let Some(item) = shared.items.pop_front() {
                // One freed slot unparks at most one pusher.
                self.not_full.notify_one();
                return Ok(Some(item));
            }
            if shared.closed {
                return Ok(None);
            }
            shared = match self.wait(&self.not_empty, shared, deadline) {
                Some(guard) => guard,
                None => return Err(PopTimedOut),
            };
        }
    }

    /// Closes the queue: no further push will succeed, and `pop` reports
    /// the terminal condition once the buffer drains. Idempotent.
    ///
    /// Broadcasts on both condvars - a single signal would be a lost-wakeup
    /// bug with more than one thread parked at close time.
    pub fn close(&self) {
        let mut shared = self.lock();
        shared.closed = true;
        drop(shared);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Parks on `condvar` until notified or `deadline` passes.
    ///
    /// Returns the reacquired guard, or `None` once the deadline has
    /// passed. Spurious wakeups are handled by the caller's predicate loop;
    /// only the deadline decides expiry.
    fn wait<'a>(
        &self,
        condvar: &Condvar,
        guard: MutexGuard<'a, Shared<T>>,
        deadline: Option<Instant>,
    ) -> Option<MutexGuard<'a, Shared<T>>> {
        match deadline {
            None => Some(condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return None;
                }
                let (guard, _) = condvar
                    .wait_timeout(guard, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                Some(guard)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_push_pop_fifo() {
        let queue = BoundedQueue::new(8);

        for i in 0..5 {
            queue.push(i).unwrap();
        }
        assert_eq!(queue.len(), 5);

        for i in 0..5 {
            assert_eq!(queue.pop(), Some(i));
        }
        assert!(queue.is_empty());
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than 0")]
    fn test_zero_capacity_panics() {
        let _ = BoundedQueue::<u32>::new(0);
    }

    #[test]
    fn test_pop_empty_open_times_out() {
        let queue = BoundedQueue::<u32>::new(2);

        assert_eq!(
            queue.pop_timeout(Duration::from_millis(10).into()),
            Err(PopTimedOut)
        );
    }

    #[test]
    fn test_push_full_times_out_state_unchanged() {
        let queue = BoundedQueue::new(2);
        queue.push(1).unwrap();
        queue.push(2).unwrap();

        assert_eq!(
            queue.push_timeout(3, Duration::from_millis(10).into()),
            Err(PushError::TimedOut(3))
        );

        // The item was handed back and nothing else moved.
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
    }

    #[test]
    fn test_push_after_close_fails_fast() {
        let queue = BoundedQueue::new(4);
        queue.push(1).unwrap();
        queue.close();

        assert_eq!(queue.push(2), Err(PushError::Closed(2)));
        assert_eq!(queue.len(), 1);
        assert_eq!(PushError::Closed(2).into_inner(), 2);
    }

    #[test]
    fn test_close_empty_pop_terminal() {
        let queue = BoundedQueue::<u32>::new(4);
        queue.close();

        assert_eq!(queue.pop(), None);
        assert!(queue.is_closed());
    }

    #[test]
    fn test_drain_after_close() {
        let queue = BoundedQueue::new(4);
        queue.push('a').unwrap();
        queue.push('b').unwrap();
        queue.close();
        queue.close(); // idempotent

        assert_eq!(queue.pop(), Some('a'));
        assert_eq!(queue.pop(), Some('b'));
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_backpressure_scenario() {
        // Capacity 2: A and B fill the queue, C must park until a pop
        // vacates a slot.
        let queue = Arc::new(BoundedQueue::new(2));
        queue.push('A').unwrap();
        queue.push('B').unwrap();

        let pusher = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push('C'))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!pusher.is_finished(), "push of C should be parked on full");

        assert_eq!(queue.pop(), Some('A'));
        pusher.join().unwrap().unwrap();

        assert_eq!(queue.pop(), Some('B'));
        assert_eq!(queue.pop(), Some('C'));
        queue.close();
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_blocked_pop_released_by_close() {
        let queue = Arc::new(BoundedQueue::<u32>::new(2));

        let popper = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(20));
        queue.close();

        assert_eq!(popper.join().unwrap(), None);
    }

    #[test]
    fn test_blocked_push_released_by_close() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.push(1).unwrap();

        let pusher = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(2))
        };

        thread::sleep(Duration::from_millis(20));
        queue.close();

        // The parked push fails fast and hands the item back.
        assert_eq!(pusher.join().unwrap(), Err(PushError::Closed(2)));
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let queue = Arc::new(BoundedQueue::new(3));

        let pusher = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..100 {
                    queue.push(i).unwrap();
                }
                queue.close();
            })
        };

        let mut popped = 0;
        loop {
            assert!(queue.len() <= queue.capacity());
            match queue.pop() {
                Some(_) => popped += 1,
                None => break,
            }
        }

        pusher.join().unwrap();
        assert_eq!(popped, 100);
    }
}
