/*!
 * Device Model
 * Abstract device kinds and per-device memory snapshots
 */

use serde::{Deserialize, Serialize};

/// Execution device kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

/// Device ordinal within its kind
pub type DeviceId = usize;

/// Snapshot of one device's memory at dispatch time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DeviceMemoryInfo {
    pub kind: DeviceKind,
    pub id: DeviceId,
    pub total_bytes: usize,
    pub free_bytes: usize,
}

impl DeviceMemoryInfo {
    #[must_use]
    pub const fn new(kind: DeviceKind, id: DeviceId, total_bytes: usize) -> Self {
        Self {
            kind,
            id,
            total_bytes,
            free_bytes: total_bytes,
        }
    }
}
