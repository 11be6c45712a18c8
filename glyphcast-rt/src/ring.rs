//! A bounded single-producer/single-consumer ring buffer that overwrites its
//! oldest entry instead of blocking the producer when full.
//!
//! The mixer and audio-render threads talk to several of these in a loop at
//! audio cadence (10-20ms); a producer that blocked on a slow consumer would
//! stall the whole mix. Dropping the oldest sample on overrun keeps the
//! producer always making progress, at the cost of an audible glitch that
//! the overrun counter makes observable instead of silent.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Ring buffer over `T`, bounded to `capacity` entries.
pub struct Ring<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
    overruns: std::sync::atomic::AtomicU64,
}

impl<T> Ring<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            overruns: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Pushes `value`, dropping the oldest entry first if the ring is full.
    /// Never blocks.
    pub fn push_overwrite(&self, value: T) {
        let mut guard = self.inner.lock();
        if guard.len() == self.capacity {
            guard.pop_front();
            self.overruns.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        guard.push_back(value);
    }

    /// Pushes every value in `values`, in order, applying the same
    /// overwrite-oldest policy as [`Self::push_overwrite`] to each.
    pub fn extend_overwrite(&self, values: impl IntoIterator<Item = T>) {
        let mut guard = self.inner.lock();
        for value in values {
            if guard.len() == self.capacity {
                guard.pop_front();
                self.overruns.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            guard.push_back(value);
        }
    }

    /// Pops the oldest entry, if any.
    pub fn pop(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    /// Pops up to `n` entries, oldest first. Returns fewer if fewer are
    /// available.
    pub fn pop_up_to(&self, n: usize) -> Vec<T> {
        let mut guard = self.inner.lock();
        let take = n.min(guard.len());
        guard.drain(..take).collect()
    }

    /// Drains every currently-buffered entry, oldest first.
    pub fn drain_all(&self) -> Vec<T> {
        self.inner.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total entries dropped to make room for a newer one, since creation.
    pub fn overrun_count(&self) -> u64 {
        self.overruns.load(std::sync::atomic::Ordering::Relaxed)
    }
}
