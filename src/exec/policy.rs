/*!
 * Execution Policy
 * Per-fragment device placement decisions
 */

use super::device::{DeviceId, DeviceKind, DeviceMemoryInfo};

/// Chooses the device a fragment's kernel work runs on
pub trait ExecutionPolicy: Send + Sync {
    fn choose(&self, fragment_idx: usize, devices: &[DeviceMemoryInfo]) -> (DeviceKind, DeviceId);
}

/// Default policy: round-robin fragments across GPU devices, CPU when
/// no GPU is available.
pub struct RoundRobinPolicy;

impl ExecutionPolicy for RoundRobinPolicy {
    fn choose(&self, fragment_idx: usize, devices: &[DeviceMemoryInfo]) -> (DeviceKind, DeviceId) {
        let gpus: Vec<&DeviceMemoryInfo> = devices
            .iter()
            .filter(|d| d.kind == DeviceKind::Gpu)
            .collect();
        if gpus.is_empty() {
            return (DeviceKind::Cpu, 0);
        }
        let gpu = gpus[fragment_idx % gpus.len()];
        (DeviceKind::Gpu, gpu.id)
    }
}

/// Forces everything onto the CPU; the retry policy after
/// `QueryMustRunOnCpu`.
pub struct CpuOnlyPolicy;

impl ExecutionPolicy for CpuOnlyPolicy {
    fn choose(&self, _fragment_idx: usize, _devices: &[DeviceMemoryInfo]) -> (DeviceKind, DeviceId) {
        (DeviceKind::Cpu, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_across_gpus() {
        let devices = vec![
            DeviceMemoryInfo::new(DeviceKind::Cpu, 0, 1 << 30),
            DeviceMemoryInfo::new(DeviceKind::Gpu, 0, 1 << 28),
            DeviceMemoryInfo::new(DeviceKind::Gpu, 1, 1 << 28),
        ];
        let policy = RoundRobinPolicy;
        assert_eq!(policy.choose(0, &devices), (DeviceKind::Gpu, 0));
        assert_eq!(policy.choose(1, &devices), (DeviceKind::Gpu, 1));
        assert_eq!(policy.choose(2, &devices), (DeviceKind::Gpu, 0));
    }

    #[test]
    fn test_falls_back_to_cpu() {
        let devices = vec![DeviceMemoryInfo::new(DeviceKind::Cpu, 0, 1 << 30)];
        assert_eq!(RoundRobinPolicy.choose(5, &devices), (DeviceKind::Cpu, 0));
    }
}
