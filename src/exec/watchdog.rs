/*!
 * Watchdog
 * Process-wide cancellation via the runtime interrupt flag
 */

use crate::runtime::errors::{check_interrupt, set_interrupt};
use tracing::info;

/// Handle over the process-wide interrupt flag polled by row functions.
/// Tripping it makes running kernels exit with the watchdog error code,
/// surfaced as a recoverable failure.
pub struct Watchdog;

impl Watchdog {
    /// Trip the interrupt: running kernels stop at their next poll
    pub fn interrupt() {
        info!("watchdog interrupt requested");
        set_interrupt(true);
    }

    /// Clear the interrupt so new queries can run
    pub fn reset() {
        set_interrupt(false);
    }

    #[must_use]
    pub fn is_tripped() -> bool {
        check_interrupt()
    }
}

/// RAII reset: clears the interrupt flag when dropped, so a tripped
/// query cannot poison the next one.
pub struct InterruptGuard;

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        set_interrupt(false);
    }
}
