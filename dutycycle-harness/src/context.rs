//! Run gates and message totals shared by every role thread.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

const PENDING: u8 = 0;
const OPEN: u8 = 1;
const CLOSED: u8 = 2;

/// Observable state of a [`Gate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Not yet opened. Threads wait.
    Pending,
    /// Threads run.
    Open,
    /// Threads exit. Terminal.
    Closed,
}

/// Three-state run flag for one role.
///
/// Moves `Pending → Open → Closed`, or straight to `Closed`. A closed gate
/// never reopens.
pub struct Gate {
    state: CachePadded<AtomicU8>,
}

impl Gate {
    /// Creates a pending gate.
    pub const fn new() -> Self {
        Self {
            state: CachePadded::new(AtomicU8::new(PENDING)),
        }
    }

    /// Opens a pending gate. Returns `false` if it was already open or
    /// closed.
    pub fn open(&self) -> bool {
        self.state
            .compare_exchange(PENDING, OPEN, Ordering::Release, Ordering::Relaxed)
            .is_ok()
    }

    /// Closes the gate.
    pub fn close(&self) {
        self.state.store(CLOSED, Ordering::Release);
    }

    /// Returns `true` while the gate is open.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) == OPEN
    }

    /// Current state.
    pub fn state(&self) -> GateState {
        match self.state.load(Ordering::Acquire) {
            PENDING => GateState::Pending,
            OPEN => GateState::Open,
            _ => GateState::Closed,
        }
    }

    /// Spins while the gate is pending.
    ///
    /// Returns `true` once open, `false` if it was closed first.
    pub fn wait_open(&self) -> bool {
        loop {
            match self.state() {
                GateState::Pending => std::hint::spin_loop(),
                GateState::Open => return true,
                GateState::Closed => return false,
            }
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Gate").field(&self.state()).finish()
    }
}

/// State shared by every thread of one experiment.
#[derive(Debug, Default)]
pub struct ExperimentContext {
    /// Run gate for consumers.
    pub consumers: Gate,
    /// Run gate for producers.
    pub producers: Gate,
    /// Run gate for background workers and counter threads.
    pub workers: Gate,
    sent: CachePadded<AtomicU64>,
    received: CachePadded<AtomicU64>,
}

impl ExperimentContext {
    /// Creates a context with all gates pending.
    pub const fn new() -> Self {
        Self {
            consumers: Gate::new(),
            producers: Gate::new(),
            workers: Gate::new(),
            sent: CachePadded::new(AtomicU64::new(0)),
            received: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Adds a producer's final count.
    pub fn add_sent(&self, count: u64) {
        self.sent.fetch_add(count, Ordering::Relaxed);
    }

    /// Adds a consumer's final count.
    pub fn add_received(&self, count: u64) {
        self.received.fetch_add(count, Ordering::Relaxed);
    }

    /// Total items pushed.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Total items popped.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Closes every gate.
    pub fn close_all(&self) {
        self.producers.close();
        self.consumers.close();
        self.workers.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn gate_lifecycle() {
        let gate = Gate::new();
        assert_eq!(gate.state(), GateState::Pending);
        assert!(!gate.is_open());

        assert!(gate.open());
        assert!(gate.is_open());
        assert!(!gate.open());

        gate.close();
        assert_eq!(gate.state(), GateState::Closed);
        assert!(!gate.is_open());
    }

    #[test]
    fn closed_gate_never_reopens() {
        let gate = Gate::new();
        gate.close();
        assert!(!gate.open());
        assert!(!gate.wait_open());
        assert_eq!(gate.state(), GateState::Closed);
    }

    #[test]
    fn waiter_released_by_open() {
        let gate = Gate::new();
        thread::scope(|s| {
            let waiter = s.spawn(|| gate.wait_open());
            gate.open();
            assert!(waiter.join().unwrap());
        });
    }

    #[test]
    fn waiter_released_by_close() {
        let gate = Gate::new();
        thread::scope(|s| {
            let waiter = s.spawn(|| gate.wait_open());
            gate.close();
            assert!(!waiter.join().unwrap());
        });
    }

    #[test]
    fn totals_accumulate() {
        let ctx = ExperimentContext::new();
        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    ctx.add_sent(10);
                    ctx.add_received(7);
                });
            }
        });
        assert_eq!(ctx.sent(), 40);
        assert_eq!(ctx.received(), 28);
    }

    #[test]
    fn close_all() {
        let ctx = ExperimentContext::new();
        ctx.consumers.open();
        ctx.close_all();
        assert_eq!(ctx.producers.state(), GateState::Closed);
        assert_eq!(ctx.consumers.state(), GateState::Closed);
        assert_eq!(ctx.workers.state(), GateState::Closed);
    }
}
