//! Tick sources for the tracker and the simulated work loops.
//!
//! On x86_64 a tick is one time-stamp-counter cycle. Elsewhere it falls
//! back to one nanosecond of monotonic time. [`ReferenceClock`] records how
//! many ticks make a nanosecond so durations and rates can be derived.

use std::time::Duration;

/// Source of monotonically increasing ticks.
pub trait Clock {
    /// Current tick count.
    fn now(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    #[inline]
    fn now(&self) -> u64 {
        (**self).now()
    }
}

/// Reads the processor's time-stamp counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TscClock;

impl Clock for TscClock {
    #[inline]
    fn now(&self) -> u64 {
        ticks()
    }
}

/// Current tick count of the default clock.
#[inline]
#[must_use]
pub fn ticks() -> u64 {
    #[cfg(target_arch = "x86_64")]
    // Safety: rdtscp only reads the counter and is present on every x86_64 target.
    unsafe {
        let mut aux: u32 = 0;
        core::arch::x86_64::__rdtscp(&mut aux)
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        use std::sync::OnceLock;
        use std::time::Instant;
        static START: OnceLock<Instant> = OnceLock::new();
        #[allow(clippy::cast_possible_truncation)]
        let nanos = START.get_or_init(Instant::now).elapsed().as_nanos() as u64;
        nanos
    }
}

/// Reference tick rate in GHz (ticks per nanosecond) for the default clock.
#[cfg(target_arch = "x86_64")]
pub const DEFAULT_GHZ: f64 = 3.0;

/// Reference tick rate in GHz (ticks per nanosecond) for the default clock.
#[cfg(not(target_arch = "x86_64"))]
pub const DEFAULT_GHZ: f64 = 1.0;

/// Conversion between ticks and wall-clock time.
///
/// The rate is a configured reference, not a measurement: the time-stamp
/// counter runs at a fixed frequency that has to be set per host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceClock {
    ticks_per_ns: f64,
}

impl ReferenceClock {
    /// Creates a reference running at `ghz` ticks per nanosecond.
    #[must_use]
    pub const fn from_ghz(ghz: f64) -> Self {
        Self { ticks_per_ns: ghz }
    }

    /// Ticks per nanosecond.
    #[must_use]
    pub const fn ticks_per_ns(self) -> f64 {
        self.ticks_per_ns
    }

    /// Number of ticks in `duration`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn ticks_in(self, duration: Duration) -> u64 {
        (duration.as_nanos() as f64 * self.ticks_per_ns) as u64
    }

    /// Wall-clock time covered by `ticks`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_of(self, ticks: u64) -> Duration {
        Duration::from_secs_f64(ticks as f64 / self.ticks_per_ns / 1e9)
    }
}

impl Default for ReferenceClock {
    fn default() -> Self {
        Self::from_ghz(DEFAULT_GHZ)
    }
}

/// Spins until `ticks` have elapsed since `since`.
///
/// Used to simulate work: the thread stays busy on its core instead of
/// yielding to the scheduler.
#[inline]
pub fn busy_wait<C: Clock>(clock: &C, since: u64, ticks: u64) {
    while clock.now().wrapping_sub(since) < ticks {
        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_are_monotonic() {
        let a = ticks();
        let b = ticks();
        assert!(b >= a);
    }

    #[test]
    fn busy_wait_waits_at_least_requested() {
        let clock = TscClock;
        let start = clock.now();
        busy_wait(&clock, start, 10_000);
        assert!(clock.now() - start >= 10_000);
    }

    #[test]
    fn busy_wait_zero_returns_immediately() {
        let clock = TscClock;
        busy_wait(&clock, clock.now(), 0);
    }

    #[test]
    fn reference_conversions() {
        let reference = ReferenceClock::from_ghz(3.0);
        assert_eq!(reference.ticks_in(Duration::from_micros(2)), 6_000);
        assert_eq!(reference.duration_of(3_000_000_000), Duration::from_secs(1));
        assert!((reference.ticks_per_ns() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn default_reference_matches_tick_source() {
        let expected = if cfg!(target_arch = "x86_64") { 3.0 } else { 1.0 };
        assert!((DEFAULT_GHZ - expected).abs() < f64::EPSILON);
        assert!((ReferenceClock::default().ticks_per_ns() - expected).abs() < f64::EPSILON);
        // 300 ns is 900 TSC cycles, or 300 nanosecond ticks.
        let ticks = ReferenceClock::default().ticks_in(Duration::from_nanos(300));
        assert_eq!(ticks, if cfg!(target_arch = "x86_64") { 900 } else { 300 });
    }

    #[test]
    fn clock_through_reference() {
        fn read<C: Clock>(clock: C) -> u64 {
            clock.now()
        }

        let clock = TscClock;
        let a = read(&clock);
        let b = read(&&clock);
        assert!(b >= a);
    }
}
