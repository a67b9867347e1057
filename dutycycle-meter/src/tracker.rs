//! Duty-cycle tracker and the cell it publishes through.
//!
//! Ownership is split in two:
//!
//! - [`DutyCycleTracker`] belongs to one consumer thread. Its counters are
//!   plain integers that only that thread touches.
//! - [`TrackerCell`] is shared with the monitor. It holds the last
//!   published [`Results`] and a control word whose `CLEAR` bit is the
//!   monitor's one-shot request to start a new observation window.
//!
//! ```text
//!  consumer                          monitor
//!  ────────                          ───────
//!  checkpoint drop
//!    CLEAR set? → zero counters
//!    accumulate marks
//!    publish(results)  ──────────▶   get_results(reset)
//!    CLEAR consumed? → drop bit        CLEAR set? → zero snapshot
//!                                      else load, set CLEAR if reset
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::clock::{Clock, ReferenceClock, TscClock};
use crate::results::{AtomicResults, Results};

/// Control bit: the monitor has read the current window and wants the
/// counters restarted.
const CLEAR: u32 = 1;

/// How ticks are turned into a bandwidth figure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterConfig {
    /// Tick rate of the tracker's clock.
    pub reference: ReferenceClock,
    /// Length of the bandwidth time unit in nanoseconds (1e9 = per second).
    pub unit_ns: f64,
}

impl MeterConfig {
    /// Bandwidth per second.
    pub const PER_SECOND: f64 = 1e9;

    /// Creates a config reporting bandwidth per `unit_ns` nanoseconds.
    #[must_use]
    pub const fn new(reference: ReferenceClock, unit_ns: f64) -> Self {
        Self { reference, unit_ns }
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self::new(ReferenceClock::default(), Self::PER_SECOND)
    }
}

// ============================================================================
// Shared cell
// ============================================================================

/// The part of a tracker visible to the monitor.
#[derive(Default)]
pub struct TrackerCell {
    results: AtomicResults,
    // Written by the monitor about once a second; sharing a line with
    // `results` costs nothing measurable at that rate.
    control: AtomicU32,
}

impl TrackerCell {
    /// Creates a cell holding the zero snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            results: AtomicResults::new(),
            control: AtomicU32::new(0),
        }
    }

    /// Reads the latest snapshot.
    ///
    /// Returns the zero snapshot if the tracker has not published since
    /// the previous reset read. With `reset`, the tracker restarts its
    /// window at its next checkpoint.
    pub fn get_results(&self, reset: bool) -> Results {
        if self.is_clear_pending() {
            return Results::default();
        }

        let results = self.results.load();
        if reset {
            self.control.fetch_or(CLEAR, Ordering::AcqRel);
        }
        results
    }

    /// Returns `true` while a reset request is waiting for the tracker.
    #[inline]
    pub fn is_clear_pending(&self) -> bool {
        self.control.load(Ordering::Acquire) & CLEAR != 0
    }

    #[inline]
    fn publish(&self, results: Results) {
        self.results.publish(results);
    }

    #[inline]
    fn acknowledge_clear(&self) {
        self.control.fetch_and(!CLEAR, Ordering::Release);
    }
}

impl fmt::Debug for TrackerCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerCell")
            .field("results", &self.results.load())
            .field("clear_pending", &self.is_clear_pending())
            .finish()
    }
}

// ============================================================================
// Tracker
// ============================================================================

/// Accumulates one consumer's polling and working time.
pub struct DutyCycleTracker<'a, C: Clock = TscClock> {
    cell: &'a TrackerCell,
    clock: C,
    config: MeterConfig,

    window_start: u64,
    overhead: u64,
    saturation: u64,
    polls: u32,
    works: u32,
}

impl<'a, C: Clock> DutyCycleTracker<'a, C> {
    /// Creates a tracker publishing to `cell`. The first window starts now.
    pub fn new(cell: &'a TrackerCell, clock: C, config: MeterConfig) -> Self {
        let window_start = clock.now();
        Self {
            cell,
            clock,
            config,
            window_start,
            overhead: 0,
            saturation: 0,
            polls: 0,
            works: 0,
        }
    }

    /// Restarts the observation window at the current tick.
    pub fn start(&mut self) {
        self.window_start = self.clock.now();
    }

    /// Opens a checkpoint, taking the first mark now.
    ///
    /// The checkpoint is recorded when it is dropped, whichever path the
    /// iteration took.
    pub fn checkpoint(&mut self) -> Checkpoint<'_, 'a, C> {
        let one = self.clock.now();
        Checkpoint {
            tracker: self,
            one,
            two: None,
            three: None,
        }
    }

    /// Records one iteration's marks and publishes a fresh snapshot.
    ///
    /// `two` is the tick after the poll, `three` the tick after the work
    /// (absent when the poll came back empty).
    pub fn record(&mut self, one: u64, two: Option<u64>, three: Option<u64>) {
        let clearing = self.cell.is_clear_pending();
        if clearing {
            self.reset(one);
        }

        if let Some(two) = two {
            self.overhead = self.overhead.saturating_add(two.saturating_sub(one));
        }
        self.polls = self.polls.saturating_add(1);

        if let Some(three) = three {
            let from = two.unwrap_or(one);
            self.saturation = self.saturation.saturating_add(three.saturating_sub(from));
            self.works = self.works.saturating_add(1);
        }

        let end = self.clock.now().max(three.or(two).unwrap_or(one));
        self.cell.publish(self.compute(end));

        if clearing {
            self.cell.acknowledge_clear();
        }
    }

    /// Computes the snapshot for a window ending at `end`.
    #[must_use]
    pub fn compute(&self, end: u64) -> Results {
        Results::new(
            bandwidth(
                self.works,
                end.saturating_sub(self.window_start),
                &self.config,
            ),
            saturation_cycles(self.saturation, self.overhead),
            saturation_ratio(self.works, self.polls),
        )
    }

    fn reset(&mut self, at: u64) {
        self.window_start = at;
        self.overhead = 0;
        self.saturation = 0;
        self.polls = 0;
        self.works = 0;
    }

    /// Polls recorded in the current window.
    pub const fn polls(&self) -> u32 {
        self.polls
    }

    /// Successful polls recorded in the current window.
    pub const fn works(&self) -> u32 {
        self.works
    }

    /// Ticks spent polling in the current window.
    pub const fn overhead_ticks(&self) -> u64 {
        self.overhead
    }

    /// Ticks spent working in the current window.
    pub const fn work_ticks(&self) -> u64 {
        self.saturation
    }
}

impl<C: Clock> fmt::Debug for DutyCycleTracker<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DutyCycleTracker")
            .field("window_start", &self.window_start)
            .field("overhead", &self.overhead)
            .field("saturation", &self.saturation)
            .field("polls", &self.polls)
            .field("works", &self.works)
            .finish_non_exhaustive()
    }
}

/// Scoped bracket around one consumer iteration.
///
/// Mark one is taken on creation. Call [`mark_two`](Self::mark_two) right
/// after the poll and [`mark_three`](Self::mark_three) after the work, if
/// any. Dropping the checkpoint records it.
pub struct Checkpoint<'t, 'a, C: Clock> {
    tracker: &'t mut DutyCycleTracker<'a, C>,
    one: u64,
    two: Option<u64>,
    three: Option<u64>,
}

impl<C: Clock> Checkpoint<'_, '_, C> {
    /// Marks the end of the poll. Returns the tick.
    #[inline]
    pub fn mark_two(&mut self) -> u64 {
        let now = self.tracker.clock.now();
        self.two = Some(now);
        now
    }

    /// Marks the end of the work. Returns the tick.
    #[inline]
    pub fn mark_three(&mut self) -> u64 {
        let now = self.tracker.clock.now();
        self.three = Some(now);
        now
    }

    /// The clock marks are taken from.
    #[inline]
    pub fn clock(&self) -> &C {
        &self.tracker.clock
    }
}

impl<C: Clock> Drop for Checkpoint<'_, '_, C> {
    fn drop(&mut self) {
        self.tracker.record(self.one, self.two, self.three);
    }
}

// ============================================================================
// Metric computation
// ============================================================================

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn fixed_point(part: f64, whole: f64) -> u16 {
    if whole <= 0.0 {
        return 0;
    }
    let ratio = (part / whole).clamp(0.0, 1.0);
    (ratio * f64::from(Results::PRECISION)) as u16
}

/// Fixed-point share of time spent working: `work / (work + overhead)`.
///
/// Zero when no time was recorded at all.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn saturation_cycles(work_ticks: u64, overhead_ticks: u64) -> u16 {
    let total = work_ticks.saturating_add(overhead_ticks);
    fixed_point(work_ticks as f64, total as f64)
}

/// Fixed-point share of polls that found an item: `works / polls`.
///
/// Zero when nothing was polled.
#[must_use]
pub fn saturation_ratio(works: u32, polls: u32) -> u16 {
    fixed_point(f64::from(works), f64::from(polls))
}

/// Items per time unit over a window of `elapsed_ticks`.
///
/// Zero for an empty window. Saturates at `u32::MAX`.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn bandwidth(works: u32, elapsed_ticks: u64, config: &MeterConfig) -> u32 {
    if elapsed_ticks == 0 {
        return 0;
    }
    let ticks_per_unit = config.reference.ticks_per_ns() * config.unit_ns;
    let units = elapsed_ticks as f64 / ticks_per_unit;
    (f64::from(works) / units) as u32
}
