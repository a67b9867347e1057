//! End-to-end scenarios over the queue and the experiment runner.

use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use dutycycle_harness::roles::{ItemQueue, WorkItem};
use dutycycle_harness::{ExperimentConfig, NoPinning, run_queue_experiment};
use dutycycle_queue::{Alignment, CacheAligned, MpmcQueue, Unaligned};

fn short_run(roles: &str) -> ExperimentConfig {
    let mut config = ExperimentConfig::new(roles.parse().unwrap());
    config.work_cycles = 0;
    config.work_iterations = 0;
    config.interval = Duration::from_millis(20);
    config.intervals = 5;
    config.warmup = Duration::from_millis(10);
    config.drain = Duration::from_millis(100);
    config.pin = false;
    config
}

#[test]
fn one_producer_one_consumer_zero_delay() {
    let config = short_run("pc");
    assert_eq!(config.capacity, 128);

    let report = run_queue_experiment::<Unaligned>(&config, &NoPinning, |_| {}).unwrap();

    assert!(report.sent > 0);
    assert!(report.received <= report.sent);
    // The drain delay empties the queue; only an in-flight item can be lost
    assert!(report.sent - report.received <= 1);
    assert_eq!(report.summary.intervals, 5);
}

#[test]
fn cache_aligned_run_reports_bandwidth() {
    let report =
        run_queue_experiment::<CacheAligned>(&short_run("pcc"), &NoPinning, |_| {}).unwrap();
    assert_eq!(report.consumers, 2);
    assert!(report.received > 0);
    assert!(report.summary.max > 0);
}

#[test]
fn full_queue_rejects_until_pop() {
    let queue = MpmcQueue::<u32>::new(4).unwrap();
    let barrier = Barrier::new(2);

    thread::scope(|s| {
        for base in [0u32, 100] {
            let queue = &queue;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                queue.push(base).unwrap();
                queue.push(base + 1).unwrap();
            });
        }
    });

    assert_eq!(queue.len(), 4);
    assert_eq!(queue.push(999), Err(999));
    assert_eq!(queue.push(999), Err(999));

    let first = queue.pop().unwrap();
    assert!(first == 0 || first == 100);
    assert_eq!(queue.push(999), Ok(()));
    assert_eq!(queue.push(1000), Err(1000));
}

#[test]
fn empty_pop_then_push_into_same_slot() {
    let queue = ItemQueue::<CacheAligned>::new(8).unwrap();

    assert!(queue.pop().is_none());
    assert!(queue.pop().is_none());
    assert!(queue.is_empty());

    let item = WorkItem {
        seq: 1,
        work_cycles: 6_000,
        work_iterations: 10,
    };
    queue.push(CacheAligned::wrap(item)).unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.pop().map(|cell| *cell), Some(item));
}
