//! Cache-line alignment policies.
//!
//! An experiment is run once per policy so the two layouts can be
//! compared directly:
//!
//! - [`CacheAligned`] wraps values in [`CachePadded`], giving each its own
//!   cache line (two lines on x86_64, matching the adjacent-line
//!   prefetcher).
//! - [`Unaligned`] wraps values in [`Unpadded`], a transparent newtype that
//!   keeps the natural alignment. Neighbouring values can then land on the
//!   same line and false-share.
//!
//! # Example
//!
//! ```
//! use dutycycle_queue::{Alignment, CacheAligned, Unaligned};
//! use std::sync::atomic::AtomicU32;
//!
//! let padded = CacheAligned::wrap(AtomicU32::new(0));
//! let packed = Unaligned::wrap(AtomicU32::new(0));
//!
//! assert!(std::mem::align_of_val(&padded) >= 64);
//! assert_eq!(std::mem::align_of_val(&packed), 4);
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};

use crossbeam_utils::CachePadded;

/// Chooses how shared values are laid out in memory.
///
/// The policy is a type parameter rather than a runtime flag so that the
/// layout of every wrapped value is fixed at compile time.
pub trait Alignment: Send + Sync + 'static {
    /// Wrapper applied to each shared value.
    type Cell<T: Send + Sync>: Deref<Target = T> + DerefMut + Send + Sync;

    /// Short name used in logs and reports.
    const NAME: &'static str;

    /// Wraps `value` according to this policy.
    fn wrap<T: Send + Sync>(value: T) -> Self::Cell<T>;
}

/// Every wrapped value starts on its own cache line.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheAligned;

impl Alignment for CacheAligned {
    type Cell<T: Send + Sync> = CachePadded<T>;

    const NAME: &'static str = "cache-aligned";

    #[inline]
    fn wrap<T: Send + Sync>(value: T) -> Self::Cell<T> {
        CachePadded::new(value)
    }
}

/// Wrapped values keep their natural alignment.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unaligned;

impl Alignment for Unaligned {
    type Cell<T: Send + Sync> = Unpadded<T>;

    const NAME: &'static str = "unaligned";

    #[inline]
    fn wrap<T: Send + Sync>(value: T) -> Self::Cell<T> {
        Unpadded(value)
    }
}

/// Transparent wrapper with the same size and alignment as `T`.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct Unpadded<T>(pub T);

impl<T> Unpadded<T> {
    /// Unwraps the value.
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Unpadded<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Unpadded<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for Unpadded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Unpadded").field(&self.0).finish()
    }
}
