//! Lock-free duty-cycle metering.
//!
//! A consumer thread brackets every poll of its queue with a
//! [`Checkpoint`]. The owning [`DutyCycleTracker`] accumulates how long the
//! thread spent polling versus doing work, and after each checkpoint
//! publishes a fresh [`Results`] snapshot to its [`TrackerCell`]. A monitor
//! thread reads the cell with [`TrackerCell::get_results`].
//!
//! The three metrics are packed into one `u64` and published with a single
//! atomic store, so a reader always sees all three fields from the same
//! computation. No locks are taken on either side.
//!
//! # Example
//!
//! ```
//! use dutycycle_meter::{DutyCycleTracker, MeterConfig, TrackerCell, TscClock};
//!
//! let cell = TrackerCell::new();
//! let mut tracker = DutyCycleTracker::new(&cell, TscClock, MeterConfig::default());
//!
//! // Empty poll
//! {
//!     let mut checkpoint = tracker.checkpoint();
//!     checkpoint.mark_two();
//! }
//!
//! // Successful poll followed by work
//! {
//!     let mut checkpoint = tracker.checkpoint();
//!     checkpoint.mark_two();
//!     checkpoint.mark_three();
//! }
//!
//! assert_eq!(tracker.polls(), 2);
//! assert_eq!(tracker.works(), 1);
//!
//! // Monitor side
//! let results = cell.get_results(true);
//! assert_eq!(results.saturation_ratio(), 0.5);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
mod field;
pub mod results;
pub mod tracker;

pub use clock::{Clock, ReferenceClock, TscClock};
pub use results::{AtomicResults, Results};
pub use tracker::{Checkpoint, DutyCycleTracker, MeterConfig, TrackerCell};
