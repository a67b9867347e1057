//! Queue experiment runner.
//!
//! ```text
//!  open consumers + workers ─ warmup ─ open producers ─ N intervals ─┐
//!                                                                    │
//!  join ◀─ close workers ◀─ close consumers ◀─ drain ◀─ close producers
//! ```

use std::fmt;
use std::mem::{align_of, size_of};
use std::thread::{self, ScopedJoinHandle};

use dutycycle_meter::{DutyCycleTracker, TrackerCell, TscClock};
use dutycycle_queue::{Alignment, MpmcQueue};
use tracing::{debug, info};

use crate::affinity::{CorePinner, pin_or_exit};
use crate::config::{ExperimentConfig, Role};
use crate::context::ExperimentContext;
use crate::error::{Error, Result};
use crate::monitor::{Monitor, MonitorSummary, Sample};
use crate::roles::{self, ItemQueue, WorkItem};
use crate::shared::SharedWorkData;

/// Outcome of one queue experiment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExperimentReport {
    /// Items pushed by all producers.
    pub sent: u64,
    /// Items popped by all consumers.
    pub received: u64,
    /// Number of consumer threads.
    pub consumers: usize,
    /// Total bandwidth over the monitored intervals.
    pub summary: MonitorSummary,
}

impl fmt::Display for ExperimentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total sent = {}", self.sent)?;
        writeln!(f, "Total recv = {}", self.received)?;
        write!(f, "{}", self.summary)
    }
}

/// Runs one experiment with every shared value laid out per `A`.
///
/// `report` is called with each interval's sample.
///
/// # Errors
///
/// Fails on an invalid config before any thread starts, or after the run
/// if a role thread panicked.
pub fn run_queue_experiment<A: Alignment>(
    config: &ExperimentConfig,
    pinner: &dyn CorePinner,
    mut report: impl FnMut(&Sample),
) -> Result<ExperimentReport> {
    config.validate()?;

    let queue: ItemQueue<A> = MpmcQueue::new(config.capacity)?;
    let shared = SharedWorkData::<A>::new();
    let ctx = ExperimentContext::new();

    let consumers = config.roles.count(Role::Consumer);
    let cells: Box<[A::Cell<TrackerCell>]> = (0..consumers)
        .map(|_| A::wrap(TrackerCell::new()))
        .collect();
    let mut monitor = Monitor::new(cells.iter().map(|cell| &**cell))?;

    info!(
        alignment = A::NAME,
        item_align = align_of::<A::Cell<WorkItem>>(),
        slot_size = ItemQueue::<A>::SLOT_SIZE,
        tracker_size = size_of::<DutyCycleTracker<'static>>(),
        tracker_cell_size = size_of::<A::Cell<TrackerCell>>(),
        shared_size = size_of::<SharedWorkData<A>>(),
        "layout"
    );

    let template = WorkItem {
        seq: 0,
        work_cycles: config.work_cycles,
        work_iterations: config.work_iterations,
    };
    let meter = config.meter();
    let worker_delay = config.worker_delay_ticks();

    let joined = thread::scope(|s| {
        let queue = &queue;
        let shared = &shared;
        let ctx = &ctx;
        let pin = config.pin;

        let mut handles: Vec<(Role, ScopedJoinHandle<'_, u64>)> = Vec::new();
        let mut free_cells = cells.iter();

        for (core, role) in config.roles.iter() {
            let handle = match role {
                Role::Producer => s.spawn(move || {
                    if pin {
                        pin_or_exit(pinner, core);
                    }
                    roles::producer::<A>(queue, ctx, template)
                }),
                Role::Consumer => {
                    let Some(cell) = free_cells.next() else {
                        continue;
                    };
                    s.spawn(move || {
                        if pin {
                            pin_or_exit(pinner, core);
                        }
                        let mut tracker = DutyCycleTracker::new(&**cell, TscClock, meter);
                        roles::consumer(queue, ctx, shared, &mut tracker)
                    })
                }
                Role::Worker => s.spawn(move || {
                    if pin {
                        pin_or_exit(pinner, core);
                    }
                    roles::worker(shared, ctx, &TscClock, worker_delay)
                }),
                Role::Idle => continue,
            };
            debug!(core, role = role.name(), "spawned");
            handles.push((role, handle));
        }

        ctx.consumers.open();
        ctx.workers.open();
        thread::sleep(config.warmup);
        ctx.producers.open();
        info!(
            intervals = config.intervals,
            interval_ms = config.interval.as_millis(),
            "producers started"
        );

        monitor.run(config.interval, config.intervals, &mut report);

        ctx.producers.close();
        thread::sleep(config.drain);
        ctx.consumers.close();
        ctx.workers.close();

        let mut first_panic = None;
        for (role, handle) in handles {
            if handle.join().is_err() && first_panic.is_none() {
                first_panic = Some(Error::ThreadPanicked { role: role.name() });
            }
        }
        first_panic.map_or(Ok(()), Err)
    });
    joined?;

    info!(sent = ctx.sent(), received = ctx.received(), "experiment finished");
    Ok(ExperimentReport {
        sent: ctx.sent(),
        received: ctx.received(),
        consumers,
        summary: monitor.summary(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affinity::NoPinning;
    use dutycycle_queue::{CacheAligned, Unaligned};
    use std::time::Duration;

    fn quick(roles: &str) -> ExperimentConfig {
        let mut config = ExperimentConfig::new(roles.parse().unwrap_or_default());
        config.work_cycles = 100;
        config.work_iterations = 1;
        config.interval = Duration::from_millis(10);
        config.intervals = 3;
        config.warmup = Duration::from_millis(5);
        config.drain = Duration::from_millis(20);
        config.pin = false;
        config
    }

    #[test]
    fn invalid_config_starts_nothing() {
        let mut config = quick("pc");
        config.capacity = 3;
        let mut samples = 0;
        let result = run_queue_experiment::<Unaligned>(&config, &NoPinning, |_| samples += 1);
        assert!(matches!(result, Err(Error::Capacity(_))));
        assert_eq!(samples, 0);
    }

    #[test]
    fn reports_every_interval() {
        let config = quick("pcw");
        let mut samples = Vec::new();
        let report =
            run_queue_experiment::<CacheAligned>(&config, &NoPinning, |s| samples.push(s.clone()))
                .unwrap();

        assert_eq!(samples.len(), 3);
        assert!(samples.iter().all(|s| s.consumers.len() == 1));
        assert_eq!(report.consumers, 1);
        assert_eq!(report.summary.intervals, 3);
        assert!(report.received <= report.sent);
    }

    #[test]
    fn consumers_without_producers_receive_nothing() {
        let report = run_queue_experiment::<Unaligned>(&quick("cc"), &NoPinning, |_| {}).unwrap();
        assert_eq!(report.sent, 0);
        assert_eq!(report.received, 0);
        assert_eq!(report.consumers, 2);
        assert_eq!(report.summary.max, 0);
    }

    #[test]
    fn report_display() {
        let report = ExperimentReport {
            sent: 10,
            received: 9,
            consumers: 1,
            summary: MonitorSummary {
                intervals: 1,
                min: 5,
                mean: 5.0,
                p50: 5,
                p99: 5,
                max: 5,
            },
        };
        let text = report.to_string();
        assert!(text.starts_with("Total sent = 10\nTotal recv = 9\n"));
    }
}
