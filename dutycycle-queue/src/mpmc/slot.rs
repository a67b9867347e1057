//! Slot storage for the MPMC ring buffer.
//!
//! Each slot's completion flag is stored as a position stamp so that a
//! flag left over from a previous lap can never be mistaken for the
//! current one:
//!
//! - `stamp == pos`: empty, writable by the push that claims `pos`
//! - `stamp == pos + 1`: holds the payload for the pop that claims `pos`
//! - `stamp == pos + capacity`: recycled, writable one lap later

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::AtomicUsize;

/// One storage unit: completion stamp plus payload.
#[repr(C)]
pub(crate) struct Slot<T> {
    pub(crate) stamp: AtomicUsize,
    pub(crate) data: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn empty_at(pos: usize) -> Self {
        Self {
            stamp: AtomicUsize::new(pos),
            data: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Allocates `capacity` slots, each ready for the first lap's push.
    pub(crate) fn allocate(capacity: usize) -> Box<[Self]> {
        (0..capacity).map(Self::empty_at).collect()
    }
}

/// Signed distance between a slot's stamp and the stamp a caller expects.
///
/// Zero means the slot is in the expected state, negative means it lags a
/// lap behind, positive means another thread already moved past it.
#[inline]
#[allow(clippy::cast_possible_wrap)]
pub(crate) const fn lag(stamp: usize, expected: usize) -> isize {
    stamp.wrapping_sub(expected) as isize
}
