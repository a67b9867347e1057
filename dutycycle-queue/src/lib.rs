//! # dutycycle-queue
//!
//! Bounded lock-free ring buffer queue used by the duty-cycle harness,
//! plus the cache-line alignment policy the harness threads through every
//! piece of shared state.
//!
//! ## Features
//!
//! - **MPMC**: Multi-producer multi-consumer bounded queue with
//!   non-blocking `push` / `pop`
//! - **Alignment policies**: [`CacheAligned`] and [`Unaligned`] select at
//!   compile time whether shared values get their own cache line
//!
//! ## Design Goals
//!
//! - No allocations after construction
//! - Single contiguous slot buffer owned by the queue
//! - Cache-line isolation between the enqueue and dequeue positions
//! - Full / empty reported as a value, never by blocking
//!
//! ## Example
//!
//! ```
//! use dutycycle_queue::MpmcQueue;
//!
//! // Capacity must be a power of two
//! let queue = MpmcQueue::<u64>::new(1024).unwrap();
//!
//! queue.push(42).unwrap();
//! assert_eq!(queue.pop(), Some(42));
//! assert_eq!(queue.pop(), None);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod align;
pub mod mpmc;

pub use align::{Alignment, CacheAligned, Unaligned, Unpadded};
pub use mpmc::{CapacityError, MpmcQueue};
