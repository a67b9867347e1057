//! Packed metric snapshots and the atomic channel that carries them.
//!
//! Layout of the packed word:
//!
//! ```text
//! 63            48 47            32 31                             0
//! ┌───────────────┬───────────────┬────────────────────────────────┐
//! │ sat. ratio    │ sat. cycles   │ bandwidth                      │
//! └───────────────┴───────────────┴────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::field::BitField;

const BANDWIDTH: BitField = BitField::new(0, 32);
const SATURATION_CYCLES: BitField = BitField::new(32, 16);
const SATURATION_RATIO: BitField = BitField::new(48, 16);

const _: () = assert!(BANDWIDTH.max_value() == u32::MAX as u64);
const _: () = assert!(SATURATION_CYCLES.max_value() == u16::MAX as u64);
const _: () = assert!(SATURATION_RATIO.max_value() == u16::MAX as u64);

/// One consumer's metrics for the current observation window.
///
/// Both saturation figures are fixed point with [`Results::PRECISION`]
/// steps per unit, so `10_000` means 1.0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Results {
    bandwidth: u32,
    saturation_cycles: u16,
    saturation_ratio: u16,
}

impl Results {
    /// Fixed-point scale of the saturation fields.
    pub const PRECISION: u16 = 10_000;

    /// Creates a snapshot from raw field values.
    #[must_use]
    pub const fn new(bandwidth: u32, saturation_cycles: u16, saturation_ratio: u16) -> Self {
        Self {
            bandwidth,
            saturation_cycles,
            saturation_ratio,
        }
    }

    /// Consumed items per time unit.
    #[must_use]
    pub const fn bandwidth(self) -> u32 {
        self.bandwidth
    }

    /// Fraction of time spent working rather than polling, in `[0, 1]`.
    #[must_use]
    pub fn saturation_cycles(self) -> f32 {
        f32::from(self.saturation_cycles) / f32::from(Self::PRECISION)
    }

    /// Fraction of polls that yielded an item, in `[0, 1]`.
    #[must_use]
    pub fn saturation_ratio(self) -> f32 {
        f32::from(self.saturation_ratio) / f32::from(Self::PRECISION)
    }

    /// Raw fixed-point saturation cycles.
    #[must_use]
    pub const fn saturation_cycles_raw(self) -> u16 {
        self.saturation_cycles
    }

    /// Raw fixed-point saturation ratio.
    #[must_use]
    pub const fn saturation_ratio_raw(self) -> u16 {
        self.saturation_ratio
    }

    /// Packs all three fields into one word.
    #[must_use]
    pub const fn pack(self) -> u64 {
        let packed = BANDWIDTH.put(0, self.bandwidth as u64);
        let packed = SATURATION_CYCLES.put(packed, self.saturation_cycles as u64);
        SATURATION_RATIO.put(packed, self.saturation_ratio as u64)
    }

    /// Unpacks a word produced by [`Results::pack`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn unpack(packed: u64) -> Self {
        Self {
            bandwidth: BANDWIDTH.get(packed) as u32,
            saturation_cycles: SATURATION_CYCLES.get(packed) as u16,
            saturation_ratio: SATURATION_RATIO.get(packed) as u16,
        }
    }
}

impl fmt::Display for Results {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Temporal: saturation [Cycles] = {}",
            self.saturation_cycles()
        )?;
        writeln!(
            f,
            "Temporal: saturation [Ratio] =  {}",
            self.saturation_ratio()
        )?;
        write!(f, "Spatial: Bandwidth [work/sec] = {}", self.bandwidth)
    }
}

/// Single-word channel for [`Results`].
///
/// One writer publishes, any number of readers load. Every load returns
/// the fields of exactly one publish.
#[derive(Debug, Default)]
pub struct AtomicResults {
    packed: AtomicU64,
}

impl AtomicResults {
    /// Creates a channel holding the zero snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            packed: AtomicU64::new(0),
        }
    }

    /// Publishes a snapshot with one release store.
    #[inline]
    pub fn publish(&self, results: Results) {
        self.packed.store(results.pack(), Ordering::Release);
    }

    /// Loads the most recently published snapshot.
    #[inline]
    pub fn load(&self) -> Results {
        Results::unpack(self.packed.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_zero() {
        assert_eq!(Results::default().pack(), 0);
        assert_eq!(AtomicResults::new().load(), Results::default());
    }

    #[test]
    fn fields_land_in_their_bits() {
        let packed = Results::new(0x0102_0304, 0x0506, 0x0708).pack();
        assert_eq!(packed, 0x0708_0506_0102_0304);
    }

    #[test]
    fn extremes_survive_packing() {
        let max = Results::new(u32::MAX, u16::MAX, u16::MAX);
        assert_eq!(Results::unpack(max.pack()), max);
        assert_eq!(max.pack(), u64::MAX);
    }

    #[test]
    fn fixed_point_accessors() {
        let results = Results::new(10, Results::PRECISION, Results::PRECISION / 4);
        assert!((results.saturation_cycles() - 1.0).abs() < f32::EPSILON);
        assert!((results.saturation_ratio() - 0.25).abs() < f32::EPSILON);
        assert_eq!(results.saturation_cycles_raw(), 10_000);
        assert_eq!(results.saturation_ratio_raw(), 2_500);
    }

    #[test]
    fn channel_returns_latest_publish() {
        let channel = AtomicResults::new();
        channel.publish(Results::new(1, 2, 3));
        channel.publish(Results::new(4, 5, 6));
        assert_eq!(channel.load(), Results::new(4, 5, 6));
    }

    #[test]
    fn display_matches_report_lines() {
        let text = Results::new(1234, 5000, 10_000).to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Temporal: saturation [Cycles] = 0.5");
        assert_eq!(lines[1], "Temporal: saturation [Ratio] =  1");
        assert_eq!(lines[2], "Spatial: Bandwidth [work/sec] = 1234");
    }
}
