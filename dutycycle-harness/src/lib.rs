//! # dutycycle-harness
//!
//! Experiments that measure the cost of false sharing between threads
//! cooperating through a [`MpmcQueue`](dutycycle_queue::MpmcQueue).
//!
//! ## Queue experiment
//!
//! A role string assigns one role per core slot:
//!
//! | char | role | does |
//! |------|------|------|
//! | `p` | producer | pushes [`WorkItem`](roles::WorkItem)s |
//! | `c` | consumer | pops, simulates work, writes the shared write half |
//! | `w` | worker | copies the write half into the read half |
//! | other | idle | nothing |
//!
//! Every consumer owns a duty-cycle tracker. The [`Monitor`] samples all
//! trackers once per interval and sums their bandwidth. The experiment is
//! run once per [`Alignment`](dutycycle_queue::Alignment) policy: with
//! [`Unaligned`](dutycycle_queue::Unaligned) the shared halves, queue
//! payloads and tracker cells share cache lines.
//!
//! ## Counter benchmark
//!
//! [`run_cacheline`] skips the queue entirely: each `p` slot increments
//! its own counter in a bank that is either packed or padded.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod affinity;
pub mod cacheline;
pub mod config;
pub mod context;
mod error;
pub mod experiment;
pub mod monitor;
pub mod roles;
pub mod shared;

pub use affinity::{CorePinner, NoPinning, SystemPinner};
pub use cacheline::{CounterBank, Tally, run_cacheline};
pub use config::{CacheLineConfig, ExperimentConfig, Role, RoleMap};
pub use context::{ExperimentContext, Gate, GateState};
pub use error::{Error, Result};
pub use experiment::{ExperimentReport, run_queue_experiment};
pub use monitor::{Monitor, MonitorSummary, Sample};
pub use shared::SharedWorkData;
