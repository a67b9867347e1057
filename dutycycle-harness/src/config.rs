//! Experiment configuration.
//!
//! Both experiment kinds take a role string with one character per core
//! slot. The character's position is the core the thread is pinned to.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use dutycycle_meter::{MeterConfig, ReferenceClock};
use dutycycle_queue::mpmc::validate_capacity;

use crate::error::{Error, Result};
use crate::roles::WORKER_DELAY;

/// What the thread on one core slot does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Pushes work items (or hammers a counter in the simple modes).
    Producer,
    /// Pops and processes work items.
    Consumer,
    /// Copies the shared write half back into the read half.
    Worker,
    /// Slot left empty.
    Idle,
}

impl Role {
    /// Maps a role-string character. Anything unrecognised is idle.
    pub const fn from_char(c: char) -> Self {
        match c {
            'p' => Self::Producer,
            'c' => Self::Consumer,
            'w' => Self::Worker,
            _ => Self::Idle,
        }
    }

    /// One-letter label used in the layout line.
    pub const fn label(self) -> char {
        match self {
            Self::Producer => 'P',
            Self::Consumer => 'C',
            Self::Worker => 'W',
            Self::Idle => 'N',
        }
    }

    /// Lower-case name for logs and thread names.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
            Self::Worker => "worker",
            Self::Idle => "idle",
        }
    }
}

/// Role per core slot, in core order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleMap {
    roles: Vec<Role>,
}

impl RoleMap {
    /// `(core, role)` pairs in core order, idle slots included.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Role)> + '_ {
        self.roles.iter().copied().enumerate()
    }

    /// Number of slots assigned `role`.
    pub fn count(&self, role: Role) -> usize {
        self.roles.iter().filter(|&&r| r == role).count()
    }

    /// Number of core slots, idle included.
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns `true` if the string was empty.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Returns `true` if at least one slot runs a thread.
    pub fn has_threads(&self) -> bool {
        self.roles.iter().any(|&r| r != Role::Idle)
    }
}

impl FromStr for RoleMap {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self {
            roles: s.chars().map(Role::from_char).collect(),
        })
    }
}

impl fmt::Display for RoleMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (core, role) in self.iter() {
            if core > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{core}:{}", role.label())?;
        }
        Ok(())
    }
}

/// Settings for a queue experiment.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    /// Thread layout.
    pub roles: RoleMap,
    /// Ticks of simulated work per iteration.
    pub work_cycles: u32,
    /// Simulated work iterations per item.
    pub work_iterations: u32,
    /// Queue capacity, a power of two.
    pub capacity: usize,
    /// Time between monitor samples.
    pub interval: Duration,
    /// Number of monitor samples.
    pub intervals: u32,
    /// Delay between starting consumers and starting producers.
    pub warmup: Duration,
    /// Delay between stopping producers and stopping consumers.
    pub drain: Duration,
    /// Tick rate used for bandwidth.
    pub reference: ReferenceClock,
    /// Pin each thread to the core matching its slot.
    pub pin: bool,
}

impl ExperimentConfig {
    /// Default ticks of work per iteration.
    ///
    /// A tick is a TSC cycle on x86_64, about 2 µs at the default 3 GHz.
    /// Elsewhere a tick is one nanosecond, so the default is 6 µs.
    pub const DEFAULT_WORK_CYCLES: u32 = 6_000;
    /// Default work iterations per item.
    pub const DEFAULT_WORK_ITERATIONS: u32 = 10;
    /// Default queue capacity.
    pub const DEFAULT_CAPACITY: usize = 128;

    /// Creates a config with default timings for `roles`.
    pub fn new(roles: RoleMap) -> Self {
        Self {
            roles,
            work_cycles: Self::DEFAULT_WORK_CYCLES,
            work_iterations: Self::DEFAULT_WORK_ITERATIONS,
            capacity: Self::DEFAULT_CAPACITY,
            interval: Duration::from_secs(1),
            intervals: 10,
            warmup: Duration::from_millis(500),
            drain: Duration::from_millis(500),
            reference: ReferenceClock::default(),
            pin: true,
        }
    }

    /// Checks the config before any thread is started.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        validate_capacity(self.capacity)?;
        if !self.roles.has_threads() {
            return Err(Error::NoRoles);
        }
        validate_ghz(self.reference)?;
        if self.intervals == 0 || self.interval.is_zero() {
            return Err(Error::InvalidInterval);
        }
        Ok(())
    }

    /// Tracker settings derived from this config.
    pub const fn meter(&self) -> MeterConfig {
        MeterConfig::new(self.reference, MeterConfig::PER_SECOND)
    }

    /// Worker copy-round delay in ticks of the reference clock.
    pub fn worker_delay_ticks(&self) -> u64 {
        self.reference.ticks_in(WORKER_DELAY)
    }

    /// Wall-clock time of one work iteration at the reference rate.
    pub fn work_time(&self) -> Duration {
        self.reference.duration_of(u64::from(self.work_cycles))
    }
}

/// Settings for the stand-alone counter benchmark.
#[derive(Debug, Clone)]
pub struct CacheLineConfig {
    /// Thread layout. Only producer slots run a counter.
    pub roles: RoleMap,
    /// Time between samples.
    pub interval: Duration,
    /// Number of samples.
    pub intervals: u32,
    /// Pin each thread to the core matching its slot.
    pub pin: bool,
}

impl CacheLineConfig {
    /// Creates a config with a one-second interval.
    pub const fn new(roles: RoleMap) -> Self {
        Self {
            roles,
            interval: Duration::from_secs(1),
            intervals: 10,
            pin: true,
        }
    }

    /// Checks the config against a bank of `limit` counters.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self, limit: usize) -> Result<()> {
        let requested = self.roles.count(Role::Producer);
        if requested == 0 {
            return Err(Error::NoRoles);
        }
        if requested > limit {
            return Err(Error::TooManyCounters { requested, limit });
        }
        if self.intervals == 0 || self.interval.is_zero() {
            return Err(Error::InvalidInterval);
        }
        Ok(())
    }
}

fn validate_ghz(reference: ReferenceClock) -> Result<()> {
    let ghz = reference.ticks_per_ns();
    if ghz.is_finite() && ghz > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidGhz(ghz))
    }
}
