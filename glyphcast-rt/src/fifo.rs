//! Bounded, drop-oldest FIFO used for outbound packet queues.
//!
//! Unlike [`crate::ring::Ring`] this carries an explicit shutdown signal:
//! the send thread for a client blocks on `pop`, and connection teardown
//! needs a way to wake it up and tell it to stop rather than leaving it
//! parked forever. Slots are preallocated at construction (a fixed `Vec` of
//! `Option<T>`) so steady-state push/pop never allocates.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

struct Inner<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

/// Bounded FIFO that overwrites its oldest entry rather than blocking the
/// producer, and can be shut down to wake a blocked consumer.
pub struct Fifo<T> {
    state: Mutex<Inner<T>>,
    not_empty: Condvar,
    capacity: usize,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl<T> Fifo<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "fifo capacity must be non-zero");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            state: Mutex::new(Inner {
                slots,
                head: 0,
                len: 0,
            }),
            not_empty: Condvar::new(),
            capacity,
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Pushes `value` onto the back of the queue. If full, drops the oldest
    /// entry to make room. A no-op once the fifo is closed.
    pub fn push(&self, value: T) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let mut inner = self.state.lock();
        if inner.len == self.capacity {
            let head = inner.head;
            inner.slots[head] = None;
            inner.head = (head + 1) % self.capacity;
            inner.len -= 1;
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        let tail = (inner.head + inner.len) % self.capacity;
        inner.slots[tail] = Some(value);
        inner.len += 1;
        drop(inner);
        self.not_empty.notify_one();
    }

    /// Blocks until an entry is available or the fifo is closed, in which
    /// case it drains whatever remains before returning `None`.
    pub fn pop_blocking(&self) -> Option<T> {
        let mut inner = self.state.lock();
        loop {
            if inner.len > 0 {
                let head = inner.head;
                let value = inner.slots[head].take();
                inner.head = (head + 1) % self.capacity;
                inner.len -= 1;
                return value;
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Non-blocking pop of up to `n` entries, oldest first.
    pub fn try_pop_up_to(&self, n: usize) -> Vec<T> {
        let mut inner = self.state.lock();
        let take = n.min(inner.len);
        let mut out = Vec::with_capacity(take);
        for _ in 0..take {
            let head = inner.head;
            if let Some(value) = inner.slots[head].take() {
                out.push(value);
            }
            inner.head = (head + 1) % self.capacity;
            inner.len -= 1;
        }
        out
    }

    /// Non-blocking pop.
    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.state.lock();
        if inner.len == 0 {
            return None;
        }
        let head = inner.head;
        let value = inner.slots[head].take();
        inner.head = (head + 1) % self.capacity;
        inner.len -= 1;
        value
    }

    /// Marks the fifo closed and wakes any thread blocked in `pop_blocking`.
    /// Entries already queued remain poppable until drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.state.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total entries dropped to make room for a newer one, since creation.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn pushes_and_pops_in_fifo_order() {
        let fifo = Fifo::new(4);
        fifo.push(1);
        fifo.push(2);
        fifo.push(3);
        assert_eq!(fifo.try_pop(), Some(1));
        assert_eq!(fifo.try_pop(), Some(2));
        assert_eq!(fifo.try_pop(), Some(3));
        assert_eq!(fifo.try_pop(), None);
    }

    #[test]
    fn try_pop_up_to_returns_at_most_n_in_order() {
        let fifo = Fifo::new(8);
        for value in 0..5 {
            fifo.push(value);
        }
        assert_eq!(fifo.try_pop_up_to(3), vec![0, 1, 2]);
        assert_eq!(fifo.try_pop_up_to(10), vec![3, 4]);
    }

    #[test]
    fn drops_oldest_on_overrun() {
        let fifo = Fifo::new(2);
        fifo.push(1);
        fifo.push(2);
        fifo.push(3);
        assert_eq!(fifo.dropped_count(), 1);
        assert_eq!(fifo.try_pop(), Some(2));
        assert_eq!(fifo.try_pop(), Some(3));
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let fifo = Arc::new(Fifo::<u32>::new(4));
        let consumer = {
            let fifo = Arc::clone(&fifo);
            std::thread::spawn(move || fifo.pop_blocking())
        };
        std::thread::sleep(Duration::from_millis(20));
        fifo.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn close_drains_remaining_before_returning_none() {
        let fifo = Fifo::new(4);
        fifo.push(1);
        fifo.push(2);
        fifo.close();
        assert_eq!(fifo.pop_blocking(), Some(1));
        assert_eq!(fifo.pop_blocking(), Some(2));
        assert_eq!(fifo.pop_blocking(), None);
    }

    #[test]
    fn push_after_close_is_noop() {
        let fifo = Fifo::new(4);
        fifo.close();
        fifo.push(1);
        assert!(fifo.is_empty());
    }

    proptest::proptest! {
        /// Invariant 4 (spec §8): for an arbitrary sequence of pushes onto a
        /// fixed-capacity fifo, size never exceeds capacity, and every push
        /// that overflows it bumps `dropped_count` by exactly one.
        #[test]
        fn size_stays_bounded_and_drops_are_counted(
            capacity in 1usize..16,
            pushes in proptest::collection::vec(proptest::prelude::any::<u32>(), 0..64),
        ) {
            let fifo = Fifo::new(capacity);
            for value in &pushes {
                let was_full = fifo.len() == capacity;
                let dropped_before = fifo.dropped_count();
                fifo.push(*value);
                proptest::prop_assert!(fifo.len() <= capacity);
                if was_full {
                    proptest::prop_assert_eq!(fifo.dropped_count(), dropped_before + 1);
                } else {
                    proptest::prop_assert_eq!(fifo.dropped_count(), dropped_before);
                }
            }
            proptest::prop_assert!(fifo.len() <= capacity);
        }
    }
}
