/*!
 * Kernel Entry Points
 *
 * The outer "multifrag query" loop: iterate the fragments assigned to
 * this kernel, call the row function once per row, poll the watchdog,
 * and stop on scan limits or recorded global errors.
 */

use super::expr::{ColumnSlice, InnerTableView};
use super::row_fn::{CompiledRowFn, KernelInput};
use crate::core::limits::WATCHDOG_ROW_INTERVAL;
use crate::exec::device::DeviceKind;
use crate::join::table::JoinHashTable;
use crate::layout::descriptor::QueryMemoryDescriptor;
use crate::layout::output::OutputBuffer;
use crate::runtime::errors::{check_interrupt, record_error_code, ERR_INTERRUPTED};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tracing::trace;

/// One outer fragment's column views for a kernel invocation
pub struct FragmentInput<'a> {
    pub fragment_id: u32,
    pub row_count: usize,
    /// Global row offset of this fragment within its table
    pub row_offset: usize,
    pub columns: Vec<ColumnSlice<'a>>,
}

/// Everything a kernel invocation reads: outer fragments, broadcast
/// inner tables, the literal blob, and the join tables. Mirrors the
/// runtime ABI parameter list.
pub struct MultifragInput<'a> {
    pub fragments: Vec<FragmentInput<'a>>,
    pub inner_tables: &'a [InnerTableView],
    pub literals: &'a [i64],
    pub join_tables: &'a [Arc<JoinHashTable>],
    pub max_matched: Option<usize>,
}

fn run_kernel(
    row_fn: &CompiledRowFn,
    input: &MultifragInput<'_>,
    literals: &[i64],
    out: &mut OutputBuffer,
    error: &mut i32,
    total_matched: &AtomicUsize,
) {
    let mut inner_rows: Vec<i64> = Vec::with_capacity(row_fn.joins.len());
    let mut key_scratch: Vec<i64> = Vec::with_capacity(row_fn.qmd.key_count.max(1));

    for fragment in &input.fragments {
        trace!(
            fragment = fragment.fragment_id,
            rows = fragment.row_count,
            offset = fragment.row_offset,
            "kernel fragment"
        );
        let kernel_input = KernelInput {
            outer: &fragment.columns,
            inner_tables: input.inner_tables,
            literals,
            join_tables: input.join_tables,
            max_matched: input.max_matched,
        };
        for row in 0..fragment.row_count {
            if row_fn.watchdog && row % WATCHDOG_ROW_INTERVAL == 0 && check_interrupt() {
                record_error_code(ERR_INTERRUPTED, error);
                return;
            }
            if !row_fn.run_row(
                &kernel_input,
                row,
                &mut inner_rows,
                &mut key_scratch,
                out,
                error,
                total_matched,
            ) {
                return;
            }
        }
    }
}

/// Kernel entry point without literal hoisting: constants live inside
/// the compiled expressions.
pub fn multifrag_query(
    row_fn: &CompiledRowFn,
    input: &MultifragInput<'_>,
    out: &mut OutputBuffer,
    error: &mut i32,
    total_matched: &AtomicUsize,
) {
    run_kernel(row_fn, input, &[], out, error, total_matched);
}

/// Kernel entry point with hoisted literals: the row function loads
/// constants from the per-device literal blob.
pub fn multifrag_query_hoisted_literals(
    row_fn: &CompiledRowFn,
    input: &MultifragInput<'_>,
    out: &mut OutputBuffer,
    error: &mut i32,
    total_matched: &AtomicUsize,
) {
    run_kernel(row_fn, input, input.literals, out, error, total_matched);
}

/// A fully compiled kernel: the row function plus its literal blob and
/// the descriptor it writes into.
pub struct CompiledKernel {
    pub row_fn: CompiledRowFn,
    pub literals: Vec<i64>,
    pub qmd: Arc<QueryMemoryDescriptor>,
    pub device: DeviceKind,
    pub hoisted: bool,
}

impl CompiledKernel {
    /// Run this kernel over its assigned fragments. The GPU device model
    /// swaps in the shared-memory aggregation path when the descriptor
    /// allows it.
    pub fn execute(
        &self,
        input: &MultifragInput<'_>,
        out: &mut OutputBuffer,
        error: &mut i32,
        total_matched: &AtomicUsize,
    ) {
        if self.device == DeviceKind::Gpu && super::gpu::supports_shared_memory(&self.row_fn) {
            super::gpu::multifrag_query_shared(
                &self.row_fn,
                input,
                if self.hoisted { input.literals } else { &[] },
                out,
                error,
                total_matched,
            );
            return;
        }
        if self.hoisted {
            multifrag_query_hoisted_literals(self.row_fn_ref(), input, out, error, total_matched);
        } else {
            multifrag_query(self.row_fn_ref(), input, out, error, total_matched);
        }
    }

    #[inline]
    fn row_fn_ref(&self) -> &CompiledRowFn {
        &self.row_fn
    }
}
