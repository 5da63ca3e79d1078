/*!
 * Engine Facade
 *
 * Wires a provider, the buffer pool, the code cache, and the dispatcher
 * into one handle. Queries that exceed the GPU byte budget are retried
 * on CPU, the dispatcher's recoverable escalation path.
 */

use crate::core::config::EngineConfig;
use crate::core::errors::{EngineError, EngineResult};
use crate::core::limits;
use crate::exec::device::{DeviceKind, DeviceMemoryInfo};
use crate::exec::dispatcher::{ExecError, ExecutionDispatcher, ExecutionStats};
use crate::exec::policy::{CpuOnlyPolicy, RoundRobinPolicy};
use crate::ir::unit::ExecutionUnit;
use crate::pool::manager::BufferPool;
use crate::pool::types::PoolStats;
use crate::result::result_set::ResultSet;
use crate::storage::provider::{DataProvider, SchemaProvider};
use std::sync::Arc;
use tracing::warn;

/// The query engine handle
pub struct Engine {
    dispatcher: ExecutionDispatcher,
    pool: Arc<BufferPool>,
}

impl Engine {
    /// Engine over a combined schema + data provider, CPU only
    pub fn new<P>(provider: Arc<P>, config: EngineConfig) -> Self
    where
        P: SchemaProvider + DataProvider + 'static,
    {
        let devices = vec![DeviceMemoryInfo::new(DeviceKind::Cpu, 0, usize::MAX / 2)];
        Self::with_devices(provider, config, devices)
    }

    /// Engine with an explicit device list (GPU model included)
    pub fn with_devices<P>(
        provider: Arc<P>,
        config: EngineConfig,
        devices: Vec<DeviceMemoryInfo>,
    ) -> Self
    where
        P: SchemaProvider + DataProvider + 'static,
    {
        let schema: Arc<dyn SchemaProvider> = provider.clone();
        let data: Arc<dyn DataProvider> = provider;
        let gpu_bytes = devices
            .iter()
            .filter(|d| d.kind == DeviceKind::Gpu)
            .map(|d| d.total_bytes)
            .sum::<usize>()
            .max(limits::DEFAULT_GPU_SLAB_SIZE);
        let pool = Arc::new(BufferPool::new(
            data,
            limits::DEFAULT_SLAB_SIZE,
            usize::MAX / 2,
            limits::DEFAULT_GPU_SLAB_SIZE,
            gpu_bytes,
        ));
        let dispatcher =
            ExecutionDispatcher::new(schema, Arc::clone(&pool), config, devices);
        Self { dispatcher, pool }
    }

    /// Execute an execution unit, retrying on CPU when the device
    /// budget rejects the GPU placement.
    pub fn execute(&self, unit: &ExecutionUnit) -> EngineResult<ResultSet> {
        self.execute_with_hint(unit, None)
    }

    /// Execute with a group cardinality hint for baseline layouts
    pub fn execute_with_hint(
        &self,
        unit: &ExecutionUnit,
        cardinality_hint: Option<usize>,
    ) -> EngineResult<ResultSet> {
        match self
            .dispatcher
            .execute(unit, &RoundRobinPolicy, cardinality_hint)
        {
            Err(EngineError::Exec(ExecError::QueryMustRunOnCpu)) => {
                warn!("retrying query on CPU");
                self.dispatcher
                    .execute(unit, &CpuOnlyPolicy, cardinality_hint)
            }
            other => other,
        }
    }

    /// Execute and return dispatch accounting alongside the result
    pub fn execute_detailed(
        &self,
        unit: &ExecutionUnit,
        cardinality_hint: Option<usize>,
    ) -> EngineResult<(ResultSet, ExecutionStats)> {
        match self
            .dispatcher
            .execute_detailed(unit, &RoundRobinPolicy, cardinality_hint)
        {
            Err(EngineError::Exec(ExecError::QueryMustRunOnCpu)) => {
                warn!("retrying query on CPU");
                self.dispatcher
                    .execute_detailed(unit, &CpuOnlyPolicy, cardinality_hint)
            }
            other => other,
        }
    }

    #[must_use]
    pub fn cpu_pool_stats(&self) -> PoolStats {
        self.pool.cpu().stats()
    }

    #[must_use]
    pub fn gpu_pool_stats(&self) -> PoolStats {
        self.pool.gpu().stats()
    }

    #[must_use]
    pub fn code_cache_stats(&self) -> crate::codegen::CodeCacheStats {
        self.dispatcher.code_cache().stats()
    }
}
