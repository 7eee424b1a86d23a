//! Lock-free single-producer/single-consumer sample ring.
//!
//! Decouples the sampler tick from bus publication. Fixed power-of-two
//! capacity, no locks, no overwrite: the producer returns `false` on a full
//! ring and the sampler counts the drop. Cursors are monotonically
//! increasing sequence numbers masked into the slot array; producer and
//! consumer cursors live on separate cache lines so neither side's stores
//! invalidate the other's line.
//!
//! ## Memory Ordering
//!
//! The producer writes the slot, then publishes its cursor with release;
//! the consumer acquires the producer cursor before reading a slot and
//! publishes its own cursor with release after copying the record out. The
//! matching acquire on the consumer cursor keeps the producer from reusing
//! a slot that is still being read.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use static_assertions::const_assert;

use stage_common::sample::PositionSample;

/// Assumed cache line size for cursor separation.
const CACHE_LINE: usize = 64;

const_assert!(core::mem::size_of::<AtomicUsize>() <= CACHE_LINE);

/// Pads its contents to a full cache line.
#[repr(align(64))]
struct CacheAligned<T>(T);

struct RingInner {
    /// Producer cursor: sequence number of the next slot to write.
    head: CacheAligned<AtomicUsize>,
    /// Consumer cursor: sequence number of the next slot to read.
    tail: CacheAligned<AtomicUsize>,
    /// Capacity - 1; capacity is a power of two.
    mask: usize,
    slots: Box<[UnsafeCell<PositionSample>]>,
}

// One thread writes each slot before publishing it and no slot is accessed
// by both sides at once, so sharing the inner storage is sound.
unsafe impl Send for RingInner {}
unsafe impl Sync for RingInner {}

impl RingInner {
    #[inline]
    fn capacity(&self) -> usize {
        self.mask + 1
    }

    #[inline]
    fn occupancy(&self) -> usize {
        let head = self.head.0.load(Ordering::Acquire);
        let tail = self.tail.0.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }
}

/// Create a ring with the given power-of-two capacity.
///
/// # Panics
/// Panics if `capacity` is zero or not a power of two.
pub fn sample_ring(capacity: usize) -> (Producer, Consumer) {
    assert!(
        capacity.is_power_of_two() && capacity >= 2,
        "ring capacity must be a power of two >= 2, got {capacity}"
    );

    let slots = (0..capacity)
        .map(|_| UnsafeCell::new(PositionSample::default()))
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let inner = Arc::new(RingInner {
        head: CacheAligned(AtomicUsize::new(0)),
        tail: CacheAligned(AtomicUsize::new(0)),
        mask: capacity - 1,
        slots,
    });

    (
        Producer {
            inner: Arc::clone(&inner),
        },
        Consumer { inner },
    )
}

/// Producer half; exclusively owned by the sampler.
pub struct Producer {
    inner: Arc<RingInner>,
}

impl Producer {
    /// Push one sample. Returns `false` without blocking when the ring is
    /// full; the record is never overwritten on top of unread data.
    #[inline]
    pub fn try_push(&mut self, sample: PositionSample) -> bool {
        let head = self.inner.head.0.load(Ordering::Relaxed);
        let tail = self.inner.tail.0.load(Ordering::Acquire);
        if head.wrapping_sub(tail) == self.inner.capacity() {
            return false;
        }

        let slot = &self.inner.slots[head & self.inner.mask];
        // SAFETY: only this producer writes slots, and `head` has not been
        // published yet, so the consumer cannot be reading this slot.
        unsafe { *slot.get() = sample };

        self.inner.head.0.store(head.wrapping_add(1), Ordering::Release);
        true
    }

    /// Occupancy gauge shareable with observers.
    pub fn depth_gauge(&self) -> RingDepth {
        RingDepth {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Consumer half; exclusively owned by the publisher.
pub struct Consumer {
    inner: Arc<RingInner>,
}

impl Consumer {
    /// Pop the oldest sample, or `None` when the ring is empty.
    #[inline]
    pub fn try_pop(&mut self) -> Option<PositionSample> {
        let tail = self.inner.tail.0.load(Ordering::Relaxed);
        let head = self.inner.head.0.load(Ordering::Acquire);
        if tail == head {
            return None;
        }

        let slot = &self.inner.slots[tail & self.inner.mask];
        // SAFETY: `tail < head`, so the producer has published this slot
        // and will not touch it again until `tail` moves past it.
        let sample = unsafe { *slot.get() };

        self.inner.tail.0.store(tail.wrapping_add(1), Ordering::Release);
        Some(sample)
    }

    /// Lower bound on readable slots; safe under concurrent production.
    #[inline]
    pub fn available(&self) -> usize {
        let tail = self.inner.tail.0.load(Ordering::Relaxed);
        let head = self.inner.head.0.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    /// Ring capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Occupancy gauge shareable with observers.
    pub fn depth_gauge(&self) -> RingDepth {
        RingDepth {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Read-only occupancy view for status reporting; approximate under
/// concurrent traffic.
#[derive(Clone)]
pub struct RingDepth {
    inner: Arc<RingInner>,
}

impl RingDepth {
    /// Current number of buffered samples.
    #[inline]
    pub fn occupancy(&self) -> usize {
        self.inner.occupancy()
    }

    /// Ring capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn sample(n: u64) -> PositionSample {
        PositionSample::at(n)
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn rejects_non_power_of_two_capacity() {
        let _ = sample_ring(100);
    }

    #[test]
    fn push_pop_in_order() {
        let (mut tx, mut rx) = sample_ring(8);
        for n in 0..5 {
            assert!(tx.try_push(sample(n)));
        }
        assert_eq!(rx.available(), 5);
        for n in 0..5 {
            assert_eq!(rx.try_pop().unwrap().timestamp_ns, n);
        }
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn full_ring_refuses_without_overwriting() {
        let (mut tx, mut rx) = sample_ring(4);
        for n in 0..4 {
            assert!(tx.try_push(sample(n)));
        }
        assert!(!tx.try_push(sample(99)));
        assert!(!tx.try_push(sample(100)));

        // All four original records survive untouched.
        for n in 0..4 {
            assert_eq!(rx.try_pop().unwrap().timestamp_ns, n);
        }
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn wraps_around_many_times() {
        let (mut tx, mut rx) = sample_ring(4);
        for n in 0..1000u64 {
            assert!(tx.try_push(sample(n)));
            assert_eq!(rx.try_pop().unwrap().timestamp_ns, n);
        }
    }

    #[test]
    fn depth_gauge_tracks_occupancy() {
        let (mut tx, mut rx) = sample_ring(8);
        let depth = rx.depth_gauge();
        assert_eq!(depth.occupancy(), 0);
        assert_eq!(depth.capacity(), 8);

        tx.try_push(sample(1));
        tx.try_push(sample(2));
        assert_eq!(depth.occupancy(), 2);

        rx.try_pop();
        assert_eq!(depth.occupancy(), 1);
    }

    #[test]
    fn cross_thread_fifo_order_and_conservation() {
        const COUNT: u64 = 100_000;
        let (mut tx, mut rx) = sample_ring(256);

        let producer = thread::spawn(move || {
            let mut pushed = 0u64;
            let mut n = 0u64;
            while n < COUNT {
                if tx.try_push(sample(n)) {
                    pushed += 1;
                    n += 1;
                } else {
                    thread::yield_now();
                }
            }
            pushed
        });

        let mut last_seen: Option<u64> = None;
        let mut popped = 0u64;
        while popped < COUNT {
            if let Some(s) = rx.try_pop() {
                if let Some(prev) = last_seen {
                    assert!(s.timestamp_ns > prev, "out of order: {} after {prev}", s.timestamp_ns);
                }
                last_seen = Some(s.timestamp_ns);
                popped += 1;
            } else {
                thread::yield_now();
            }
        }

        let pushed = producer.join().unwrap();
        assert_eq!(pushed, COUNT);
        assert_eq!(popped, COUNT);
        assert_eq!(rx.available(), 0);
    }
}
