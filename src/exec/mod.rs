/*!
 * Execution Module
 * Device model, placement policy, the dispatcher, and the watchdog
 */

pub mod device;
pub mod dispatcher;
pub mod policy;
pub mod watchdog;

// Re-export public API
pub use device::{DeviceId, DeviceKind, DeviceMemoryInfo};
pub use dispatcher::{ExecError, ExecutionDispatcher, ExecutionStats};
pub use policy::{CpuOnlyPolicy, ExecutionPolicy, RoundRobinPolicy};
pub use watchdog::{InterruptGuard, Watchdog};
