//! Thread-to-core pinning.

use tracing::{debug, error};

use crate::error::{Error, Result};

/// Pins the calling thread to a core.
pub trait CorePinner: Sync {
    /// Pins the current thread to `core`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Affinity`] if the OS refused.
    fn pin(&self, core: usize) -> Result<()>;
}

/// Pins through the OS scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPinner;

impl CorePinner for SystemPinner {
    fn pin(&self, core: usize) -> Result<()> {
        if core_affinity::set_for_current(core_affinity::CoreId { id: core }) {
            debug!(core, "pinned");
            Ok(())
        } else {
            Err(Error::Affinity { core })
        }
    }
}

/// Leaves threads wherever the scheduler puts them.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPinning;

impl CorePinner for NoPinning {
    fn pin(&self, _core: usize) -> Result<()> {
        Ok(())
    }
}

/// Number of cores the OS reports, if it reports any.
pub fn available_cores() -> Option<usize> {
    core_affinity::get_core_ids().map(|ids| ids.len())
}

/// Pins the current thread or terminates the process with status 1.
pub fn pin_or_exit(pinner: &dyn CorePinner, core: usize) {
    if let Err(err) = pinner.pin(core) {
        error!(core, %err, "cannot pin thread, exiting");
        std::process::exit(1);
    }
}
