//! Periodic sampling of consumer trackers.

use std::fmt;
use std::thread;
use std::time::Duration;

use dutycycle_meter::{Results, TrackerCell};
use hdrhistogram::Histogram;
use tracing::trace;

use crate::error::Result;

/// One interval's readings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Snapshot per consumer, in consumer order.
    pub consumers: Vec<Results>,
    /// Sum of every consumer's bandwidth.
    pub total_bandwidth: u64,
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for results in &self.consumers {
            writeln!(f, "{results}")?;
        }
        write!(f, "Total Bandwidth = {}", self.total_bandwidth)
    }
}

/// Distribution of total bandwidth over all intervals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorSummary {
    /// Number of intervals sampled.
    pub intervals: u64,
    /// Lowest total.
    pub min: u64,
    /// Mean total.
    pub mean: f64,
    /// Median total.
    pub p50: u64,
    /// 99th percentile total.
    pub p99: u64,
    /// Highest total.
    pub max: u64,
}

impl fmt::Display for MonitorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bandwidth over {} intervals: min = {}, mean = {:.0}, p50 = {}, p99 = {}, max = {}",
            self.intervals, self.min, self.mean, self.p50, self.p99, self.max
        )
    }
}

/// Reads every consumer's cell once per interval.
///
/// Each read requests a reset, so every sample covers one interval.
pub struct Monitor<'a> {
    cells: Vec<&'a TrackerCell>,
    histogram: Histogram<u64>,
}

impl<'a> Monitor<'a> {
    /// Creates a monitor over `cells`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Histogram`](crate::Error::Histogram) if the histogram cannot be allocated.
    pub fn new(cells: impl IntoIterator<Item = &'a TrackerCell>) -> Result<Self> {
        let histogram = Histogram::new(3)?;
        Ok(Self {
            cells: cells.into_iter().collect(),
            histogram,
        })
    }

    /// Takes one reading of every cell.
    pub fn sample(&mut self) -> Sample {
        let consumers: Vec<Results> = self
            .cells
            .iter()
            .map(|cell| cell.get_results(true))
            .collect();
        let total_bandwidth = consumers
            .iter()
            .map(|results| u64::from(results.bandwidth()))
            .sum();

        self.histogram.saturating_record(total_bandwidth);
        trace!(total_bandwidth, "sampled");
        Sample {
            consumers,
            total_bandwidth,
        }
    }

    /// Sleeps `interval` then samples, `count` times, handing each sample
    /// to `report`.
    pub fn run(&mut self, interval: Duration, count: u32, mut report: impl FnMut(&Sample)) {
        for _ in 0..count {
            thread::sleep(interval);
            let sample = self.sample();
            report(&sample);
        }
    }

    /// Summary of every sample taken so far.
    pub fn summary(&self) -> MonitorSummary {
        MonitorSummary {
            intervals: self.histogram.len(),
            min: self.histogram.min(),
            mean: self.histogram.mean(),
            p50: self.histogram.value_at_quantile(0.5),
            p99: self.histogram.value_at_quantile(0.99),
            max: self.histogram.max(),
        }
    }
}

impl fmt::Debug for Monitor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("cells", &self.cells.len())
            .field("samples", &self.histogram.len())
            .finish()
    }
}
