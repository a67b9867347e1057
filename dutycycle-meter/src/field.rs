//! Bit fields within a packed `u64`.

/// A contiguous range of bits inside a `u64`.
///
/// Precomputes the mask so `get` / `put` are a shift and an `and`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BitField {
    start: u32,
    mask: u64,
}

impl BitField {
    /// Creates a field at bit position `start` with width `len`.
    ///
    /// # Panics
    ///
    /// Panics if `len` is 0 or `start + len` exceeds 64. Fields are
    /// declared as constants, so this fires at compile time.
    pub(crate) const fn new(start: u32, len: u32) -> Self {
        assert!(len > 0, "field length must be > 0");
        assert!(start + len <= u64::BITS, "field exceeds integer bounds");

        let unshifted = if len == u64::BITS {
            !0
        } else {
            (1 << len) - 1
        };

        Self {
            start,
            mask: unshifted << start,
        }
    }

    /// Maximum value this field can hold.
    pub(crate) const fn max_value(self) -> u64 {
        self.mask >> self.start
    }

    /// Extracts the field from `packed`.
    #[inline]
    pub(crate) const fn get(self, packed: u64) -> u64 {
        (packed & self.mask) >> self.start
    }

    /// Replaces the field in `packed` with `value`.
    ///
    /// Bits of `value` above the field width are discarded.
    #[inline]
    pub(crate) const fn put(self, packed: u64, value: u64) -> u64 {
        (packed & !self.mask) | ((value << self.start) & self.mask)
    }
}
