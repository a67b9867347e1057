//! Memory region shared between consumers and the background worker.
//!
//! Each half is eight counters, half a cache line. Consumers read the read
//! half and bump the write half; the worker copies the write half back
//! into the read half. With [`Unaligned`](dutycycle_queue::Unaligned) the
//! halves share a line, so every consumer write invalidates the line the
//! other consumers are reading.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use dutycycle_queue::Alignment;

/// Counters per half.
pub const HALF_LEN: usize = 8;

/// Eight independent counters.
#[derive(Default)]
pub struct WorkHalf {
    data: [AtomicU32; HALF_LEN],
}

impl WorkHalf {
    fn snapshot(&self) -> [u32; HALF_LEN] {
        std::array::from_fn(|i| self.data[i].load(Ordering::Relaxed))
    }
}

/// Read half and write half under alignment policy `A`.
#[repr(C)]
pub struct SharedWorkData<A: Alignment> {
    read: A::Cell<WorkHalf>,
    write: A::Cell<WorkHalf>,
}

impl<A: Alignment> SharedWorkData<A> {
    /// Creates a region with every counter zero.
    pub fn new() -> Self {
        Self {
            read: A::wrap(WorkHalf::default()),
            write: A::wrap(WorkHalf::default()),
        }
    }

    /// Copies the read half.
    #[inline]
    pub fn snapshot_read(&self) -> [u32; HALF_LEN] {
        self.read.snapshot()
    }

    /// Increments every counter of the write half.
    #[inline]
    pub fn publish_write(&self) {
        for counter in &self.write.data {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Copies the write half.
    #[inline]
    pub fn snapshot_write(&self) -> [u32; HALF_LEN] {
        self.write.snapshot()
    }

    /// Overwrites the read half.
    #[inline]
    pub fn store_read(&self, values: [u32; HALF_LEN]) {
        for (counter, value) in self.read.data.iter().zip(values) {
            counter.store(value, Ordering::Relaxed);
        }
    }

    /// Byte distance from the start of the read half to the write half.
    pub fn half_offset(&self) -> usize {
        let read = std::ptr::from_ref::<WorkHalf>(&self.read) as usize;
        let write = std::ptr::from_ref::<WorkHalf>(&self.write) as usize;
        write - read
    }
}

impl<A: Alignment> Default for SharedWorkData<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Alignment> fmt::Debug for SharedWorkData<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedWorkData")
            .field("alignment", &A::NAME)
            .field("read", &self.snapshot_read())
            .field("write", &self.snapshot_write())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dutycycle_queue::{CacheAligned, Unaligned};
    use std::thread;

    #[test]
    fn unaligned_halves_share_a_line() {
        let data = SharedWorkData::<Unaligned>::new();
        assert_eq!(data.half_offset(), 32);
        assert_eq!(std::mem::size_of::<SharedWorkData<Unaligned>>(), 64);
    }

    #[test]
    fn aligned_halves_are_separate_lines() {
        let data = SharedWorkData::<CacheAligned>::new();
        assert!(data.half_offset() >= 64);
    }

    #[test]
    fn worker_copy_round() {
        let data = SharedWorkData::<Unaligned>::new();
        data.publish_write();
        data.publish_write();
        assert_eq!(data.snapshot_write(), [2; HALF_LEN]);
        assert_eq!(data.snapshot_read(), [0; HALF_LEN]);

        data.store_read(data.snapshot_write());
        assert_eq!(data.snapshot_read(), [2; HALF_LEN]);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let data = SharedWorkData::<CacheAligned>::new();
        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1_000 {
                        data.publish_write();
                    }
                });
            }
        });
        assert_eq!(data.snapshot_write(), [4_000; HALF_LEN]);
    }
}
