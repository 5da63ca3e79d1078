/*!
 * Engine Configuration
 * Recognized knobs controlling layout, dispatch, and codegen decisions
 */

use crate::core::limits;
use serde::{Deserialize, Serialize};

/// Engine-wide configuration.
///
/// Every decision procedure in the engine (layout choice, device
/// dispatch, codegen flags) reads from one immutable snapshot of this
/// struct, so a query's plan is deterministic given plan + config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct EngineConfig {
    /// Fraction of device memory usable per query for input buffers (0.0-1.0)
    pub gpu_input_mem_limit_percent: f64,
    /// Enable the broadcast-inner multifrag kernel layout
    pub allow_multifrag: bool,
    /// Prefer columnar output buffers when the layout permits
    pub enable_columnar_output: bool,
    /// Upper bound on baseline hash entry count before cardinality
    /// estimation is required
    pub baseline_max_groups: usize,
    /// Switchover above which baseline is preferred over perfect hash
    pub big_group_threshold: usize,
    /// Enable runtime interrupt polling in the row function
    pub watchdog_enable: bool,
    /// Hoist literals into a per-device literal buffer
    pub hoist_literals: bool,
    /// Allow the bounded-heap streaming top-N layout
    pub enable_streaming_top_n: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gpu_input_mem_limit_percent: limits::DEFAULT_GPU_INPUT_MEM_LIMIT_PERCENT,
            allow_multifrag: true,
            enable_columnar_output: false,
            baseline_max_groups: limits::BASELINE_MAX_GROUPS,
            big_group_threshold: limits::BIG_GROUP_THRESHOLD,
            watchdog_enable: true,
            hoist_literals: true,
            enable_streaming_top_n: true,
        }
    }
}

impl EngineConfig {
    /// Validate that all knobs are within accepted ranges
    #[must_use = "validation result must be checked"]
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(0.0..=1.0).contains(&self.gpu_input_mem_limit_percent) {
            return Err("gpu_input_mem_limit_percent must be within [0.0, 1.0]");
        }
        if self.baseline_max_groups == 0 {
            return Err("baseline_max_groups must be positive");
        }
        if self.big_group_threshold == 0 {
            return Err("big_group_threshold must be positive");
        }
        if self.big_group_threshold > self.baseline_max_groups {
            return Err("big_group_threshold cannot exceed baseline_max_groups");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_gpu_mem_limit_range() {
        let mut config = EngineConfig::default();
        config.gpu_input_mem_limit_percent = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_ordering() {
        let mut config = EngineConfig::default();
        config.big_group_threshold = config.baseline_max_groups + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }
}
