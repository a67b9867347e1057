use thiserror::Error;

use dutycycle_queue::CapacityError;

/// Result alias for harness operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop an experiment before or after its threads run.
#[derive(Debug, Error)]
pub enum Error {
    /// Queue capacity is unusable.
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// Role string runs no thread.
    #[error("role string assigns no threads")]
    NoRoles,

    /// More counter threads than the bank holds.
    #[error("role string has {requested} counters, the bank holds {limit}")]
    #[allow(missing_docs)]
    TooManyCounters { requested: usize, limit: usize },

    /// Reference tick rate is zero, negative or not finite.
    #[error("reference clock rate must be positive and finite, got {0} GHz")]
    InvalidGhz(f64),

    /// Sampling would never happen.
    #[error("interval count and length must be non-zero")]
    InvalidInterval,

    /// The OS refused a core pin.
    #[error("failed to pin thread to core {core}")]
    #[allow(missing_docs)]
    Affinity { core: usize },

    /// A role thread panicked.
    #[error("{role} thread panicked")]
    #[allow(missing_docs)]
    ThreadPanicked { role: &'static str },

    /// The bandwidth histogram could not be created.
    #[error("histogram error: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),
}
