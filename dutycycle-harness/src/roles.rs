//! Thread bodies for each role.
//!
//! Every role waits on its gate, runs while the gate is open and returns
//! its count when the gate closes. Totals are added to the context once,
//! on exit.

use std::time::Duration;

use dutycycle_meter::clock::busy_wait;
use dutycycle_meter::{Clock, DutyCycleTracker};
use dutycycle_queue::{Alignment, MpmcQueue};
use tracing::debug;

use crate::context::ExperimentContext;
use crate::shared::SharedWorkData;

/// Time the worker spends on each copy round.
pub const WORKER_DELAY: Duration = Duration::from_nanos(300);

/// Synthetic unit of work carried by the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkItem {
    /// Per-producer sequence number, starting at 1.
    pub seq: u32,
    /// Ticks of simulated work per iteration.
    pub work_cycles: u32,
    /// Simulated work iterations.
    pub work_iterations: u32,
}

/// Queue of work items wrapped in alignment policy `A`.
pub type ItemQueue<A> = MpmcQueue<<A as Alignment>::Cell<WorkItem>>;

/// Pushes copies of `template` until the producer gate closes.
///
/// A full queue is retried with a spin hint. The gate is re-checked on
/// every failed attempt so a stalled consumer side never blocks shutdown.
pub fn producer<A: Alignment>(
    queue: &ItemQueue<A>,
    ctx: &ExperimentContext,
    template: WorkItem,
) -> u64 {
    if !ctx.producers.wait_open() {
        return 0;
    }

    let mut sent: u64 = 0;
    'run: while ctx.producers.is_open() {
        #[allow(clippy::cast_possible_truncation)]
        let seq = sent.wrapping_add(1) as u32;
        let mut item = A::wrap(WorkItem { seq, ..template });
        loop {
            match queue.push(item) {
                Ok(()) => {
                    sent += 1;
                    break;
                }
                Err(rejected) => {
                    if !ctx.producers.is_open() {
                        break 'run;
                    }
                    item = rejected;
                    std::hint::spin_loop();
                }
            }
        }
    }

    ctx.add_sent(sent);
    debug!(sent, "producer done");
    sent
}

/// Pops and processes items until the consumer gate closes.
///
/// Every iteration is bracketed by a checkpoint on `tracker`, whether the
/// pop found an item or not.
pub fn consumer<A: Alignment, C: Clock>(
    queue: &ItemQueue<A>,
    ctx: &ExperimentContext,
    shared: &SharedWorkData<A>,
    tracker: &mut DutyCycleTracker<'_, C>,
) -> u64 {
    if !ctx.consumers.wait_open() {
        return 0;
    }

    let mut received: u64 = 0;
    tracker.start();
    while ctx.consumers.is_open() {
        let mut checkpoint = tracker.checkpoint();
        let popped = queue.pop();
        let polled = checkpoint.mark_two();

        let Some(item) = popped else {
            std::hint::spin_loop();
            continue;
        };

        process(&item, shared, checkpoint.clock(), polled);
        checkpoint.mark_three();
        received += 1;
    }

    ctx.add_received(received);
    debug!(received, "consumer done");
    received
}

/// Simulated processing of one item.
///
/// All iterations share one deadline, `work_cycles` ticks after `since`.
fn process<A: Alignment, C: Clock>(
    item: &WorkItem,
    shared: &SharedWorkData<A>,
    clock: &C,
    since: u64,
) {
    for _ in 0..item.work_iterations {
        let local = shared.snapshot_read();
        std::hint::black_box(local);
        busy_wait(clock, since, u64::from(item.work_cycles));
        shared.publish_write();
    }
}

/// Copies the write half into the read half until the worker gate closes.
///
/// Each round spins for `delay_ticks`. Returns the number of copy rounds.
pub fn worker<A: Alignment, C: Clock>(
    shared: &SharedWorkData<A>,
    ctx: &ExperimentContext,
    clock: &C,
    delay_ticks: u64,
) -> u64 {
    if !ctx.workers.wait_open() {
        return 0;
    }
    debug!("worker launched");

    let mut rounds: u64 = 0;
    while ctx.workers.is_open() {
        let results = shared.snapshot_write();
        busy_wait(clock, clock.now(), delay_ticks);
        shared.store_read(results);
        rounds += 1;
    }

    debug!(rounds, "worker done");
    rounds
}
