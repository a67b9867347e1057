//! Multi-producer multi-consumer (MPMC) bounded queue.
//!
//! Any number of threads may push and pop concurrently through a shared
//! reference. Both operations are a single non-blocking attempt: a full
//! queue hands the value back, an empty queue returns `None`, and the
//! caller decides how to retry.
//!
//! # Example
//!
//! ```
//! use dutycycle_queue::MpmcQueue;
//! use std::thread;
//!
//! let queue = MpmcQueue::<u64>::new(64).unwrap();
//!
//! thread::scope(|s| {
//!     for p in 0..2u64 {
//!         let queue = &queue;
//!         s.spawn(move || {
//!             for i in 0..100 {
//!                 let mut value = p * 1000 + i;
//!                 while let Err(rejected) = queue.push(value) {
//!                     value = rejected;
//!                     std::hint::spin_loop();
//!                 }
//!             }
//!         });
//!     }
//!
//!     let mut received = 0;
//!     while received < 200 {
//!         if queue.pop().is_some() {
//!             received += 1;
//!         }
//!     }
//! });
//!
//! assert!(queue.is_empty());
//! ```
//!
//! # Performance Notes
//!
//! Producers and consumers both claim positions with compare-and-swap, so
//! the queue is lock-free but not wait-free: under adversarial scheduling a
//! single thread can keep losing the race while others make progress.
//!
//! Arrival order is only preserved per producer. Two producers racing for
//! adjacent positions may publish in either order.

mod slot;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

use slot::{Slot, lag};

/// Bounded lock-free MPMC queue.
///
/// The slot buffer is allocated once in [`MpmcQueue::new`] and owned by the
/// queue for its whole lifetime. Payloads are only ever touched by the
/// thread that won the position for that slot.
pub struct MpmcQueue<T> {
    /// Dequeue position. Consumers CAS on this.
    head: CachePadded<AtomicUsize>,
    /// Enqueue position. Producers CAS on this.
    tail: CachePadded<AtomicUsize>,

    slots: Box<[Slot<T>]>,
    mask: usize,
}

// Safety: payloads move between threads through push/pop, and each slot is
// accessed by exactly one thread between claiming its position and
// publishing the next stamp.
unsafe impl<T: Send> Send for MpmcQueue<T> {}
unsafe impl<T: Send> Sync for MpmcQueue<T> {}

impl<T> MpmcQueue<T> {
    /// Bytes occupied by one slot: stamp plus payload.
    pub const SLOT_SIZE: usize = std::mem::size_of::<Slot<T>>();

    /// Creates a queue holding up to `capacity` items.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError`] if `capacity` is below 2 or not a power of
    /// two. The capacity is never rounded up.
    ///
    /// # Example
    ///
    /// ```
    /// use dutycycle_queue::MpmcQueue;
    ///
    /// assert!(MpmcQueue::<u32>::new(128).is_ok());
    /// assert!(MpmcQueue::<u32>::new(100).is_err());
    /// assert!(MpmcQueue::<u32>::new(1).is_err());
    /// ```
    pub fn new(capacity: usize) -> Result<Self, CapacityError> {
        let capacity = validate_capacity(capacity)?;

        Ok(Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            slots: Slot::allocate(capacity),
            mask: capacity - 1,
        })
    }

    #[inline]
    fn slot(&self, pos: usize) -> &Slot<T> {
        // Safety: the mask keeps the index below slots.len().
        unsafe { self.slots.get_unchecked(pos & self.mask) }
    }

    /// Attempts to push a value.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` without blocking if the target slot still holds
    /// a payload no consumer has drained yet (the queue is full).
    ///
    /// # Example
    ///
    /// ```
    /// use dutycycle_queue::MpmcQueue;
    ///
    /// let queue = MpmcQueue::<u32>::new(2).unwrap();
    ///
    /// assert!(queue.push(1).is_ok());
    /// assert!(queue.push(2).is_ok());
    ///
    /// // Queue is now full
    /// assert_eq!(queue.push(3), Err(3));
    /// ```
    #[inline]
    pub fn push(&self, value: T) -> Result<(), T> {
        let backoff = Backoff::new();
        let mut tail = self.tail.load(Ordering::Acquire);

        loop {
            let slot = self.slot(tail);
            let stamp = slot.stamp.load(Ordering::Acquire);
            let diff = lag(stamp, tail);

            if diff == 0 {
                match self.tail.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // Safety: winning the CAS claims the slot until its stamp is published.
                        unsafe { (*slot.data.get()).write(value) };
                        slot.stamp.store(tail.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => {
                        tail = current;
                        backoff.spin();
                    }
                }
            } else if diff < 0 {
                // Previous lap's payload still waiting for a consumer
                return Err(value);
            } else {
                backoff.spin();
                tail = self.tail.load(Ordering::Acquire);
            }
        }
    }

    /// Attempts to pop a value.
    ///
    /// Returns `None` without blocking if the slot at the dequeue position
    /// holds no completed payload. This includes a producer that has
    /// claimed the slot but not finished writing it. An unsuccessful pop
    /// leaves the queue untouched.
    ///
    /// # Example
    ///
    /// ```
    /// use dutycycle_queue::MpmcQueue;
    ///
    /// let queue = MpmcQueue::<u32>::new(8).unwrap();
    /// assert_eq!(queue.pop(), None);
    ///
    /// queue.push(42).unwrap();
    /// assert_eq!(queue.pop(), Some(42));
    /// ```
    #[inline]
    pub fn pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        let mut head = self.head.load(Ordering::Acquire);

        loop {
            let slot = self.slot(head);
            let stamp = slot.stamp.load(Ordering::Acquire);
            let diff = lag(stamp, head.wrapping_add(1));

            if diff == 0 {
                match self.head.compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // Safety: a stamp of pos + 1 means the payload was written and published.
                        let value = unsafe { (*slot.data.get()).assume_init_read() };
                        slot.stamp
                            .store(head.wrapping_add(self.capacity()), Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => {
                        head = current;
                        backoff.spin();
                    }
                }
            } else if diff < 0 {
                return None;
            } else {
                backoff.spin();
                head = self.head.load(Ordering::Acquire);
            }
        }
    }

    /// Returns the capacity of the queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Returns the number of claimed positions not yet consumed.
    ///
    /// A snapshot only: other threads may change it before it is read.
    /// Always within `0..=capacity`.
    pub fn len(&self) -> usize {
        loop {
            let tail = self.tail.load(Ordering::SeqCst);
            let head = self.head.load(Ordering::SeqCst);

            // Retry until tail did not move while head was read
            if self.tail.load(Ordering::SeqCst) == tail {
                return tail.wrapping_sub(head).min(self.capacity());
            }
        }
    }

    /// Returns `true` if no positions are claimed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for MpmcQueue<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        let mask = self.mask;

        let mut pos = head;
        while pos != tail {
            let slot = &mut self.slots[pos & mask];
            if *slot.stamp.get_mut() == pos.wrapping_add(1) {
                // Safety: the stamp marks an unconsumed payload and &mut self excludes readers.
                unsafe { slot.data.get_mut().assume_init_drop() };
            }
            pos = pos.wrapping_add(1);
        }
    }
}

impl<T> fmt::Debug for MpmcQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpmcQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Checks that `capacity` is a power of two no smaller than 2.
///
/// # Errors
///
/// Returns [`CapacityError`] carrying the rejected value.
pub const fn validate_capacity(capacity: usize) -> Result<usize, CapacityError> {
    if capacity >= 2 && capacity.is_power_of_two() {
        Ok(capacity)
    } else {
        Err(CapacityError { requested: capacity })
    }
}

/// Error returned by [`MpmcQueue::new`] for an unusable capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityError {
    /// The capacity that was asked for.
    pub requested: usize,
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "queue capacity {} must be a power of two and at least 2",
            self.requested
        )
    }
}

impl std::error::Error for CapacityError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::thread;

    use proptest::prelude::*;

    #[test]
    fn basic_push_pop() {
        let queue = MpmcQueue::<u64>::new(8).unwrap();

        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.push(3).unwrap();

        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn rejects_bad_capacities() {
        for bad in [0, 1, 3, 6, 100, 1000] {
            assert_eq!(
                MpmcQueue::<u64>::new(bad).unwrap_err(),
                CapacityError { requested: bad }
            );
        }

        for good in [2, 4, 128, 1024] {
            assert_eq!(MpmcQueue::<u64>::new(good).unwrap().capacity(), good);
        }
    }

    #[test]
    fn queue_full() {
        let queue = MpmcQueue::<u64>::new(4).unwrap();

        for i in 1..=4 {
            queue.push(i).unwrap();
        }
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.push(5), Err(5));

        assert_eq!(queue.pop(), Some(1));
        queue.push(5).unwrap();
        assert_eq!(queue.push(6), Err(6));
    }

    #[test]
    fn empty_pop_leaves_state_unchanged() {
        let queue = MpmcQueue::<u64>::new(4).unwrap();

        for _ in 0..10 {
            assert_eq!(queue.pop(), None);
        }
        assert_eq!(queue.head.load(Ordering::Relaxed), 0);
        assert_eq!(queue.tail.load(Ordering::Relaxed), 0);
        assert!(queue.is_empty());

        queue.push(7).unwrap();
        assert_eq!(queue.pop(), Some(7));
    }

    #[test]
    fn wraps_many_laps() {
        let queue = MpmcQueue::<usize>::new(2).unwrap();

        for i in 0..10_000 {
            queue.push(i).unwrap();
            queue.push(i + 1).unwrap();
            assert_eq!(queue.pop(), Some(i));
            assert_eq!(queue.pop(), Some(i + 1));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn round_trip_is_bit_exact() {
        #[derive(Debug, Clone, Copy, PartialEq)]
        struct Wide([u64; 16], f64);

        let queue = MpmcQueue::<Wide>::new(4).unwrap();
        let sent = Wide([0xDEAD_BEEF_0123_4567; 16], -0.0);

        queue.push(sent).unwrap();
        let got = queue.pop().unwrap();
        assert_eq!(got.0, sent.0);
        assert_eq!(got.1.to_bits(), sent.1.to_bits());
    }

    #[test]
    fn drops_remaining_on_drop() {
        let drops = Arc::new(AtomicUsize::new(0));

        struct DropCounter(Arc<AtomicUsize>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let queue = MpmcQueue::<DropCounter>::new(8).unwrap();
        for _ in 0..3 {
            assert!(queue.push(DropCounter(Arc::clone(&drops))).is_ok());
        }
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(queue.pop());
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        drop(queue);
        assert_eq!(drops.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn rejected_value_is_returned_intact() {
        let queue = MpmcQueue::<String>::new(2).unwrap();
        queue.push("a".to_owned()).unwrap();
        queue.push("b".to_owned()).unwrap();

        assert_eq!(queue.push("c".to_owned()), Err("c".to_owned()));
    }

    #[test]
    fn multi_producer_multi_consumer() {
        const PRODUCERS: u64 = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: u64 = 10_000;

        let queue = MpmcQueue::<u64>::new(64).unwrap();
        let received = AtomicUsize::new(0);

        let mut seen = thread::scope(|s| {
            for p in 0..PRODUCERS {
                let queue = &queue;
                s.spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let mut value = p * PER_PRODUCER + i;
                        while let Err(v) = queue.push(value) {
                            value = v;
                            std::hint::spin_loop();
                        }
                    }
                });
            }

            let consumers: Vec<_> = (0..CONSUMERS)
                .map(|_| {
                    let queue = &queue;
                    let received = &received;
                    s.spawn(move || {
                        let mut local = Vec::new();
                        while received.load(Ordering::Relaxed) < (PRODUCERS * PER_PRODUCER) as usize
                        {
                            if let Some(v) = queue.pop() {
                                local.push(v);
                                received.fetch_add(1, Ordering::Relaxed);
                            } else {
                                std::hint::spin_loop();
                            }
                        }
                        local
                    })
                })
                .collect();

            consumers
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });

        seen.sort_unstable();
        let expected: Vec<u64> = (0..PRODUCERS * PER_PRODUCER).collect();
        assert_eq!(seen, expected, "lost or duplicated items");
    }

    #[test]
    fn per_producer_order_preserved() {
        let queue = MpmcQueue::<(u8, u32)>::new(16).unwrap();

        let seen = thread::scope(|s| {
            for p in 0..2u8 {
                let queue = &queue;
                s.spawn(move || {
                    for i in 0..5_000u32 {
                        let mut value = (p, i);
                        while let Err(v) = queue.push(value) {
                            value = v;
                            std::hint::spin_loop();
                        }
                    }
                });
            }

            let mut seen = Vec::with_capacity(10_000);
            while seen.len() < 10_000 {
                if let Some(v) = queue.pop() {
                    seen.push(v);
                }
            }
            seen
        });

        for p in 0..2u8 {
            let order: Vec<u32> = seen.iter().filter(|(q, _)| *q == p).map(|(_, i)| *i).collect();
            assert!(order.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn slot_size_tracks_payload_alignment() {
        use crate::{Alignment, CacheAligned, Unaligned};
        use std::mem::size_of;

        let packed = MpmcQueue::<<Unaligned as Alignment>::Cell<[u32; 3]>>::SLOT_SIZE;
        let padded = MpmcQueue::<<CacheAligned as Alignment>::Cell<[u32; 3]>>::SLOT_SIZE;

        assert!(packed >= size_of::<usize>() + 12);
        assert!(packed < size_of::<usize>() + 12 + size_of::<usize>());
        assert!(padded > packed);
        assert_eq!(padded % std::mem::align_of::<CachePadded<u8>>(), 0);
    }

    proptest! {
        #[test]
        fn matches_bounded_model(
            log2_capacity in 1u32..6,
            ops in proptest::collection::vec(any::<bool>(), 0..512),
        ) {
            let capacity = 1usize << log2_capacity;
            let queue = MpmcQueue::<usize>::new(capacity).unwrap();
            let mut model = VecDeque::new();
            let mut next = 0usize;

            for push in ops {
                if push {
                    let accepted = queue.push(next).is_ok();
                    prop_assert_eq!(accepted, model.len() < capacity);
                    if accepted {
                        model.push_back(next);
                    }
                    next += 1;
                } else {
                    prop_assert_eq!(queue.pop(), model.pop_front());
                }
                prop_assert_eq!(queue.len(), model.len());
                prop_assert!(queue.len() <= capacity);
            }
        }
    }
}
