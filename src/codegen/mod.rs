/*!
 * Code Generator
 *
 * Lowers an execution unit plus its query memory descriptor into a
 * compiled kernel: a row function composed over the runtime intrinsic
 * library, an outer multifrag entry point, and the hoisted literal
 * blob. Compiled kernels are cached by plan/layout/device fingerprint.
 */

pub mod cache;
pub mod expr;
pub mod extensions;
pub mod gpu;
pub mod kernel;
pub mod literals;
pub mod row_fn;

use crate::core::config::EngineConfig;
use crate::exec::device::DeviceKind;
use crate::ir::unit::ExecutionUnit;
use crate::layout::descriptor::QueryMemoryDescriptor;
use crate::storage::provider::SchemaProvider;
use std::sync::Arc;
use tracing::debug;

// Re-export public API
pub use cache::{CodeCache, CodeCacheKey, CodeCacheStats};
pub use expr::{CodegenError, CodegenResult, ColumnSlice, CompiledExpr, InnerTableView, RowCtx};
pub use extensions::{ExtensionFn, ExtensionFnRegistry};
pub use kernel::{
    multifrag_query, multifrag_query_hoisted_literals, CompiledKernel, FragmentInput,
    MultifragInput,
};
pub use literals::LiteralBuffer;
pub use row_fn::{compile_row_fn, CompiledRowFn, CompiledTarget, GroupKind, KernelInput};

/// Compile an execution unit for a device, consulting the cache first
pub fn compile(
    unit: &ExecutionUnit,
    qmd: Arc<QueryMemoryDescriptor>,
    schema: &dyn SchemaProvider,
    extensions: &extensions::ExtensionFnRegistry,
    config: &EngineConfig,
    device: DeviceKind,
    cache: &CodeCache,
) -> CodegenResult<Arc<CompiledKernel>> {
    let key = CodeCacheKey {
        unit_fingerprint: unit.fingerprint(),
        qmd_hash: qmd.structural_hash(),
        device,
        hoist_literals: config.hoist_literals,
    };
    if let Some(kernel) = cache.get(&key) {
        return Ok(kernel);
    }

    let mut literal_buffer = LiteralBuffer::new();
    let row_fn = compile_row_fn(
        unit,
        Arc::clone(&qmd),
        schema,
        extensions,
        config,
        &mut literal_buffer,
    )?;
    let literals = literal_buffer.finalize();
    debug!(
        ?device,
        literals = literals.len(),
        targets = row_fn.targets.len(),
        joins = row_fn.joins.len(),
        "compiled kernel"
    );
    let kernel = Arc::new(CompiledKernel {
        row_fn,
        literals,
        qmd,
        device,
        hoisted: config.hoist_literals,
    });
    cache.put(key, Arc::clone(&kernel));
    Ok(kernel)
}
