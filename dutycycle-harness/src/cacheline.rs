//! Stand-alone false-sharing benchmark.
//!
//! Each producer slot increments its own counter in a bank of
//! [`BANK_SIZE`] counters. Packed counters share lines, padded ones do
//! not; the per-interval counts show the difference directly.

use std::fmt;
use std::mem::{size_of, size_of_val};
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread::{self, ScopedJoinHandle};

use dutycycle_queue::Alignment;
use tracing::{debug, info};

use crate::affinity::{CorePinner, pin_or_exit};
use crate::config::{CacheLineConfig, Role};
use crate::context::Gate;
use crate::error::{Error, Result};

/// Counters in a bank.
pub const BANK_SIZE: usize = 128;

/// Fixed array of counters under alignment policy `A`.
pub struct CounterBank<A: Alignment> {
    counters: Box<[A::Cell<AtomicU32>]>,
}

impl<A: Alignment> CounterBank<A> {
    /// Creates a bank of zeroed counters.
    pub fn new() -> Self {
        Self {
            counters: (0..BANK_SIZE).map(|_| A::wrap(AtomicU32::new(0))).collect(),
        }
    }

    /// Counter at `index`.
    pub fn counter(&self, index: usize) -> Option<&AtomicU32> {
        self.counters.get(index).map(|cell| &**cell)
    }

    /// Reads and zeroes the first `count` counters.
    pub fn take(&self, count: usize) -> Tally {
        Tally {
            counts: self
                .counters
                .iter()
                .take(count)
                .map(|cell| cell.swap(0, Ordering::Relaxed))
                .collect(),
        }
    }

    /// Bytes from one counter to the next.
    pub fn stride(&self) -> usize {
        size_of::<A::Cell<AtomicU32>>()
    }

    /// Bytes occupied by the whole bank.
    pub fn size_bytes(&self) -> usize {
        size_of_val(&*self.counters)
    }
}

impl<A: Alignment> Default for CounterBank<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Alignment> fmt::Debug for CounterBank<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterBank")
            .field("alignment", &A::NAME)
            .field("stride", &self.stride())
            .finish_non_exhaustive()
    }
}

/// Per-counter increments over one interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    /// Count per counter, in slot order.
    pub counts: Vec<u32>,
}

impl Tally {
    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.iter().copied().map(u64::from).sum()
    }

    /// Mean count, zero for an empty tally.
    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> f64 {
        if self.counts.is_empty() {
            0.0
        } else {
            self.total() as f64 / self.counts.len() as f64
        }
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, count) in self.counts.iter().enumerate() {
            write!(f, "d{i} = {count}, ")?;
        }
        write!(f, "total = {}, avg = {}", self.total(), self.average())
    }
}

/// Increments `counter` until `gate` closes. Returns the increments made.
fn hammer(counter: &AtomicU32, gate: &Gate) -> u64 {
    if !gate.wait_open() {
        return 0;
    }
    let mut increments: u64 = 0;
    while gate.is_open() {
        counter.fetch_add(1, Ordering::Relaxed);
        increments += 1;
    }
    increments
}

/// Runs the counter benchmark with counters laid out per `A`.
///
/// Returns the tally of every interval, also passed to `report` as it is
/// taken.
///
/// # Errors
///
/// Fails on an invalid config before any thread starts, or if a counter
/// thread panicked.
pub fn run_cacheline<A: Alignment>(
    config: &CacheLineConfig,
    pinner: &dyn CorePinner,
    mut report: impl FnMut(&Tally),
) -> Result<Vec<Tally>> {
    config.validate(BANK_SIZE)?;

    let bank = CounterBank::<A>::new();
    let gate = Gate::new();
    let counters = config.roles.count(Role::Producer);
    info!(
        alignment = A::NAME,
        stride = bank.stride(),
        bank_size = bank.size_bytes(),
        counters,
        "counter bank"
    );

    thread::scope(|s| {
        let gate = &gate;
        let pin = config.pin;
        let mut handles: Vec<ScopedJoinHandle<'_, u64>> = Vec::with_capacity(counters);
        let mut next = 0;

        for (core, role) in config.roles.iter() {
            if role != Role::Producer {
                continue;
            }
            let Some(counter) = bank.counter(next) else {
                break;
            };
            next += 1;
            handles.push(s.spawn(move || {
                if pin {
                    pin_or_exit(pinner, core);
                }
                hammer(counter, gate)
            }));
            debug!(core, index = next - 1, "counter thread spawned");
        }

        gate.open();
        let mut tallies = Vec::with_capacity(config.intervals as usize);
        for _ in 0..config.intervals {
            thread::sleep(config.interval);
            let tally = bank.take(counters);
            report(&tally);
            tallies.push(tally);
        }
        gate.close();

        let mut panicked = false;
        for handle in handles {
            panicked |= handle.join().is_err();
        }
        if panicked {
            Err(Error::ThreadPanicked { role: "counter" })
        } else {
            Ok(tallies)
        }
    })
}
