/*!
 * Execution Dispatcher
 *
 * Turns an execution unit into per-device kernels: skips fragments via
 * min/max statistics, places the rest through the execution policy
 * under per-device byte budgets, builds join tables and inner-table
 * broadcasts, runs kernels in parallel with exclusive output buffers,
 * then reduces, sorts, and windows the final result set.
 */

use super::device::{DeviceId, DeviceKind, DeviceMemoryInfo};
use super::policy::ExecutionPolicy;
use crate::codegen::{
    compile, CodeCache, ColumnSlice, CompiledKernel, ExtensionFnRegistry, FragmentInput,
    InnerTableView, MultifragInput,
};
use crate::core::config::EngineConfig;
use crate::core::errors::{EngineError, EngineResult};
use crate::core::types::{
    fp_to_slot, inline_int_null_value, slot_null_value, Datum, TableId, TypeDesc, NULL_DOUBLE,
    NULL_FLOAT,
};
use crate::ir::expr::{BinOpKind, Expr};
use crate::ir::unit::ExecutionUnit;
use crate::join::builder::{build_join_hash_table, JoinCacheKey, JoinError, JoinHashTableCache};
use crate::join::table::{HashTableLayout, JoinHashTable};
use crate::layout::chooser::choose_query_memory_descriptor;
use crate::layout::descriptor::HashKind;
use crate::layout::output::OutputBuffer;
use crate::pool::manager::BufferPool;
use crate::pool::types::ChunkKey;
use crate::result::reduce::{reduce_buffers, ReduceError};
use crate::result::result_set::ResultSet;
use crate::result::sort::sort_result_set;
use crate::runtime::decode::{decode_double, decode_fixed_width_int, decode_float};
use crate::runtime::errors::error_message;
use crate::storage::buffer::Encoding;
use crate::storage::fragment::{ChunkStats, ColumnFragment, TableFragments};
use crate::storage::provider::{encoding_for_type, SchemaProvider};
use rayon::prelude::*;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Dispatcher errors
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Query exceeds the device memory budget and must run on CPU")]
    QueryMustRunOnCpu,

    #[error("Kernel error {code}: {message}")]
    Kernel { code: i32, message: String },

    #[error("Unknown table {0}")]
    UnknownTable(TableId),

    #[error("Unsupported plan shape: {0}")]
    UnsupportedPlan(String),

    #[error(transparent)]
    Reduce(#[from] ReduceError),
}

/// Per-query dispatch accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub skipped_fragments: usize,
    pub kernel_count: usize,
    pub gpu_kernels: usize,
}

/// One kernel's work assignment
struct KernelDesc {
    device: (DeviceKind, DeviceId),
    table: TableId,
    fragments: Vec<u32>,
}

/// The execution dispatcher
pub struct ExecutionDispatcher {
    schema: Arc<dyn SchemaProvider>,
    pool: Arc<BufferPool>,
    code_cache: Arc<CodeCache>,
    join_cache: Arc<JoinHashTableCache>,
    extensions: Arc<ExtensionFnRegistry>,
    config: EngineConfig,
    devices: Vec<DeviceMemoryInfo>,
}

impl ExecutionDispatcher {
    #[must_use]
    pub fn new(
        schema: Arc<dyn SchemaProvider>,
        pool: Arc<BufferPool>,
        config: EngineConfig,
        devices: Vec<DeviceMemoryInfo>,
    ) -> Self {
        Self {
            schema,
            pool,
            code_cache: Arc::new(CodeCache::new()),
            join_cache: Arc::new(JoinHashTableCache::new()),
            extensions: Arc::new(ExtensionFnRegistry::new()),
            config,
            devices,
        }
    }

    /// Swap in an extension whitelist
    #[must_use]
    pub fn with_extensions(mut self, extensions: Arc<ExtensionFnRegistry>) -> Self {
        self.extensions = extensions;
        self
    }

    #[must_use]
    pub fn code_cache(&self) -> &Arc<CodeCache> {
        &self.code_cache
    }

    /// Execute a unit under the given policy
    pub fn execute(
        &self,
        unit: &ExecutionUnit,
        policy: &dyn ExecutionPolicy,
        cardinality_hint: Option<usize>,
    ) -> EngineResult<ResultSet> {
        self.execute_detailed(unit, policy, cardinality_hint)
            .map(|(rs, _)| rs)
    }

    /// Execute a unit, also returning dispatch accounting
    pub fn execute_detailed(
        &self,
        unit: &ExecutionUnit,
        policy: &dyn ExecutionPolicy,
        cardinality_hint: Option<usize>,
    ) -> EngineResult<(ResultSet, ExecutionStats)> {
        let branches = self.outer_branches(unit)?;
        let outer_frags = Arc::clone(&branches[0]);

        let device_cap = self
            .devices
            .iter()
            .map(|d| d.total_bytes)
            .max()
            .unwrap_or(usize::MAX);
        let mut qmd = choose_query_memory_descriptor(
            unit,
            &outer_frags,
            &self.config,
            cardinality_hint,
            device_cap,
        )?;
        if unit.union_all && qmd.hash_kind == HashKind::Projection {
            let total: usize = branches.iter().map(|b| b.total_rows()).sum();
            qmd.entry_count = unit.scan_limit.map_or(total, |l| total.min(l));
        }
        let qmd = Arc::new(qmd);

        let (join_tables, inner_views) = self.build_join_state(unit)?;

        // fragment skipping + device placement + byte budgets
        let mut stats = ExecutionStats::default();
        let mut descs: Vec<KernelDesc> = Vec::new();
        for frags in &branches {
            let mut per_device: Vec<((DeviceKind, DeviceId), Vec<u32>)> = Vec::new();
            let mut gpu_budget: Vec<(DeviceId, usize)> = Vec::new();
            let row_bytes: usize = frags.column_types.iter().map(TypeDesc::byte_width).sum();

            for (idx, frag) in frags.fragments.iter().enumerate() {
                if fragment_skippable(frag, &unit.simple_quals) {
                    stats.skipped_fragments += 1;
                    debug!(table = frags.table, fragment = frag.id, "skipped fragment");
                    continue;
                }
                let (kind, id) = policy.choose(idx, &self.devices);
                if kind == DeviceKind::Gpu {
                    let device = self
                        .devices
                        .iter()
                        .find(|d| d.kind == DeviceKind::Gpu && d.id == id);
                    let cap = device.map_or(0, |d| {
                        (d.total_bytes as f64 * self.config.gpu_input_mem_limit_percent) as usize
                    });
                    let frag_bytes = frag.row_count * row_bytes;
                    let used = match gpu_budget.iter().position(|(i, _)| *i == id) {
                        Some(pos) => {
                            gpu_budget[pos].1 += frag_bytes;
                            gpu_budget[pos].1
                        }
                        None => {
                            gpu_budget.push((id, frag_bytes));
                            frag_bytes
                        }
                    };
                    if used > cap {
                        info!(device = id, used, cap, "gpu budget exceeded");
                        return Err(EngineError::Exec(ExecError::QueryMustRunOnCpu));
                    }
                }
                if self.config.allow_multifrag {
                    match per_device.iter_mut().find(|(d, _)| *d == (kind, id)) {
                        Some((_, list)) => list.push(frag.id),
                        None => per_device.push(((kind, id), vec![frag.id])),
                    }
                } else {
                    per_device.push(((kind, id), vec![frag.id]));
                }
            }
            for (device, fragments) in per_device {
                descs.push(KernelDesc {
                    device,
                    table: frags.table,
                    fragments,
                });
            }
        }
        stats.kernel_count = descs.len();
        stats.gpu_kernels = descs
            .iter()
            .filter(|d| d.device.0 == DeviceKind::Gpu)
            .count();

        if descs.is_empty() {
            // everything skipped: an empty (but well-formed) result
            let out = OutputBuffer::new(Arc::clone(&qmd));
            let mut rs = ResultSet::new(vec![out], Arc::clone(&qmd))
                .with_schema(Arc::clone(&self.schema));
            sort_result_set(&mut rs, &unit.sort_info);
            return Ok((rs, stats));
        }

        // compile once per device kind in use
        let mut compiled: Vec<(DeviceKind, Arc<CompiledKernel>)> = Vec::new();
        for kind in [DeviceKind::Cpu, DeviceKind::Gpu] {
            if descs.iter().any(|d| d.device.0 == kind) {
                let kernel = compile(
                    unit,
                    Arc::clone(&qmd),
                    self.schema.as_ref(),
                    self.extensions.as_ref(),
                    &self.config,
                    kind,
                    &self.code_cache,
                )?;
                compiled.push((kind, kernel));
            }
        }

        let total_matched = AtomicUsize::new(0);
        let branch_map: Vec<(TableId, Arc<TableFragments>)> = branches
            .iter()
            .map(|b| (b.table, Arc::clone(b)))
            .collect();

        // one task per (device, kernel); each owns its output buffer
        let results: Vec<EngineResult<(OutputBuffer, i32)>> = descs
            .par_iter()
            .map(|desc| {
                let kernel = compiled
                    .iter()
                    .find(|(k, _)| *k == desc.device.0)
                    .map(|(_, k)| Arc::clone(k))
                    .expect("kernel compiled for device kind");
                let frags = branch_map
                    .iter()
                    .find(|(t, _)| *t == desc.table)
                    .map(|(_, f)| Arc::clone(f))
                    .expect("branch fragments resolved");
                self.run_kernel(
                    unit,
                    desc,
                    &kernel,
                    &frags,
                    &join_tables,
                    &inner_views,
                    &total_matched,
                )
            })
            .collect();

        let mut buffers = Vec::with_capacity(results.len());
        let mut error_codes = Vec::with_capacity(results.len());
        for result in results {
            let (out, code) = result?;
            buffers.push(out);
            error_codes.push(code);
        }
        if let Some(&code) = error_codes.iter().find(|&&c| c != 0) {
            return Err(EngineError::Exec(ExecError::Kernel {
                code,
                message: error_message(code).to_owned(),
            }));
        }

        let reduced = reduce_buffers(buffers).map_err(ExecError::from)?;
        let mut rs = ResultSet::new(vec![reduced], Arc::clone(&qmd))
            .with_schema(Arc::clone(&self.schema));
        sort_result_set(&mut rs, &unit.sort_info);
        info!(
            rows = rs.row_count(),
            kernels = stats.kernel_count,
            skipped = stats.skipped_fragments,
            "query complete"
        );
        Ok((rs, stats))
    }

    /// Outer branch tables: the driving table, or every input for
    /// UNION ALL.
    fn outer_branches(&self, unit: &ExecutionUnit) -> EngineResult<Vec<Arc<TableFragments>>> {
        let tables: Vec<TableId> = if unit.union_all {
            if !unit.join_conditions.is_empty() {
                return Err(EngineError::Exec(ExecError::UnsupportedPlan(
                    "UNION ALL with joins".into(),
                )));
            }
            unit.input_tables.iter().map(|t| t.table).collect()
        } else {
            vec![unit.outer_table()]
        };
        tables
            .into_iter()
            .map(|t| {
                self.schema
                    .table_fragments(t)
                    .ok_or_else(|| EngineError::Exec(ExecError::UnknownTable(t)))
            })
            .collect()
    }

    /// Build join hash tables and broadcast inner-table views
    fn build_join_state(
        &self,
        unit: &ExecutionUnit,
    ) -> EngineResult<(Vec<Arc<JoinHashTable>>, Vec<InnerTableView>)> {
        let mut tables = Vec::with_capacity(unit.join_conditions.len());
        let mut views = Vec::with_capacity(unit.join_conditions.len());
        for (level, condition) in unit.join_conditions.iter().enumerate() {
            let inner_table = unit
                .input_tables
                .get(level + 1)
                .ok_or_else(|| {
                    EngineError::Exec(ExecError::UnsupportedPlan(
                        "join without inner table".into(),
                    ))
                })?
                .table;
            let inner_frags = self
                .schema
                .table_fragments(inner_table)
                .ok_or_else(|| EngineError::Exec(ExecError::UnknownTable(inner_table)))?;
            let view = self.decode_inner_table(&inner_frags)?;

            let (key_column, key_ty) = match &condition.inner_expr {
                Expr::ColumnRef { column, ty, .. } => (*column, *ty),
                _ => {
                    return Err(EngineError::Exec(ExecError::UnsupportedPlan(
                        "join key must be an inner column".into(),
                    )))
                }
            };
            let key_values = &view.columns[key_column as usize];
            let null_val = key_ty.nullable.then(|| slot_null_value(&key_ty));

            let cache_key = JoinCacheKey {
                table: inner_table,
                column: key_column,
                layout: HashTableLayout::OneToOne,
            };
            let built = self.join_cache.get_or_build(cache_key, || {
                build_join_hash_table(key_values, null_val, HashTableLayout::OneToOne)
            });
            let table = match built {
                Ok(table) => table,
                Err(JoinError::NeedsOneToManyHash) => {
                    // retry with the wider layout, as the failure asks
                    let cache_key = JoinCacheKey {
                        layout: HashTableLayout::OneToMany,
                        ..cache_key
                    };
                    self.join_cache.get_or_build(cache_key, || {
                        build_join_hash_table(key_values, null_val, HashTableLayout::OneToMany)
                    })?
                }
                Err(e) => return Err(e.into()),
            };
            debug!(
                table = inner_table,
                column = key_column,
                layout = ?table.layout(),
                entries = table.entry_count(),
                "join hash table ready"
            );
            tables.push(table);
            views.push(view);
        }
        Ok((tables, views))
    }

    /// Decode every column of an inner table across all its fragments
    /// into normalized slots.
    fn decode_inner_table(&self, frags: &TableFragments) -> EngineResult<InnerTableView> {
        let mut columns: Vec<Vec<i64>> =
            vec![Vec::with_capacity(frags.total_rows()); frags.column_types.len()];
        for frag in &frags.fragments {
            for (col, ty) in frags.column_types.iter().enumerate() {
                let key = ChunkKey::new(frags.table, col as u32, frag.id);
                let pinned = self
                    .pool
                    .cpu()
                    .get_buffer(key, 0)
                    .map_err(|_| JoinError::FailedToFetchColumn(key))?;
                decode_normalized_into(
                    &pinned,
                    encoding_for_type(ty),
                    ty,
                    frag.row_count,
                    &mut columns[col],
                );
            }
        }
        Ok(InnerTableView { columns })
    }

    /// Fetch one kernel's fragments from its device tier and run it
    #[allow(clippy::too_many_arguments)]
    fn run_kernel(
        &self,
        unit: &ExecutionUnit,
        desc: &KernelDesc,
        kernel: &CompiledKernel,
        frags: &TableFragments,
        join_tables: &[Arc<JoinHashTable>],
        inner_views: &[InnerTableView],
        total_matched: &AtomicUsize,
    ) -> EngineResult<(OutputBuffer, i32)> {
        let tier = match desc.device.0 {
            DeviceKind::Gpu => self.pool.gpu(),
            DeviceKind::Cpu => self.pool.cpu(),
        };

        // pin every chunk this kernel reads, then build the views
        let mut pinned = Vec::new();
        let mut shapes = Vec::new();
        for frag_id in &desc.fragments {
            let mut row_offset = 0;
            let mut frag = None;
            for candidate in &frags.fragments {
                if candidate.id == *frag_id {
                    frag = Some(candidate);
                    break;
                }
                row_offset += candidate.row_count;
            }
            let frag = frag.expect("assigned fragment exists");
            let mut chunk_range = Vec::with_capacity(frags.column_types.len());
            for (col, ty) in frags.column_types.iter().enumerate() {
                let key = ChunkKey::new(desc.table, col as u32, frag.id);
                let buffer = tier.get_buffer(key, 0)?;
                chunk_range.push((buffer, encoding_for_type(ty)));
            }
            shapes.push((*frag_id, frag.row_count, row_offset));
            pinned.push(chunk_range);
        }

        let fragments: Vec<FragmentInput<'_>> = pinned
            .iter()
            .zip(&shapes)
            .map(|(chunks, (frag_id, row_count, row_offset))| FragmentInput {
                fragment_id: *frag_id,
                row_count: *row_count,
                row_offset: *row_offset,
                columns: chunks
                    .iter()
                    .map(|(buffer, encoding)| ColumnSlice {
                        bytes: buffer.bytes(),
                        encoding: *encoding,
                    })
                    .collect(),
            })
            .collect();

        let input = MultifragInput {
            fragments,
            inner_tables: inner_views,
            literals: &kernel.literals,
            join_tables,
            max_matched: unit.scan_limit,
        };
        let mut out = OutputBuffer::new(Arc::clone(&kernel.qmd));
        let mut error_code = 0i32;
        kernel.execute(&input, &mut out, &mut error_code, total_matched);
        Ok((out, error_code))
    }
}

/// Decode a chunk into normalized slots, appending to `out`
fn decode_normalized_into(
    bytes: &[u8],
    encoding: Encoding,
    ty: &TypeDesc,
    row_count: usize,
    out: &mut Vec<i64>,
) {
    let width = encoding.byte_width();
    if ty.kind.is_fp() {
        for pos in 0..row_count {
            let v = if width == 4 {
                let f = decode_float(bytes, pos);
                if f == NULL_FLOAT {
                    NULL_DOUBLE
                } else {
                    f as f64
                }
            } else {
                decode_double(bytes, pos)
            };
            out.push(fp_to_slot(v));
        }
    } else {
        let width_null = inline_int_null_value(width);
        let internal_null = slot_null_value(ty);
        for pos in 0..row_count {
            let v = match encoding {
                Encoding::DiffFixedWidth { baseline, .. } => {
                    crate::runtime::decode::decode_diff(bytes, width, baseline, pos)
                }
                _ => decode_fixed_width_int(bytes, width, pos),
            };
            out.push(if ty.nullable && v == width_null {
                internal_null
            } else {
                v
            });
        }
    }
}

/// Whether fragment statistics prove no row can satisfy the sargable
/// quals.
fn fragment_skippable(fragment: &ColumnFragment, simple_quals: &[Expr]) -> bool {
    for qual in simple_quals {
        let Some((column, op, datum)) = qual.as_sargable() else {
            continue;
        };
        let Some(stats) = fragment.column_stats(column) else {
            continue;
        };
        if stats_exclude(stats, op, datum) {
            return true;
        }
    }
    false
}

fn stat_f64(datum: &Datum) -> Option<f64> {
    match datum {
        Datum::Int(v) => Some(*v as f64),
        Datum::Double(v) => Some(*v),
        _ => None,
    }
}

/// True when [min, max] cannot intersect `col OP lit`. Fragments with
/// nulls only ever skip on range grounds (nulls never satisfy a
/// comparison).
fn stats_exclude(stats: &ChunkStats, op: BinOpKind, lit: &Datum) -> bool {
    let (Some(min), Some(max), Some(lit)) = (
        stat_f64(&stats.min),
        stat_f64(&stats.max),
        stat_f64(lit),
    ) else {
        return false;
    };
    match op {
        BinOpKind::Eq => lit < min || lit > max,
        BinOpKind::Ne => min == max && min == lit,
        BinOpKind::Lt => min >= lit,
        BinOpKind::Le => min > lit,
        BinOpKind::Gt => max <= lit,
        BinOpKind::Ge => max < lit,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(lo: i64, hi: i64) -> ChunkStats {
        ChunkStats {
            min: Datum::Int(lo),
            max: Datum::Int(hi),
            has_nulls: false,
        }
    }

    #[test]
    fn test_stats_exclusion_rules() {
        let s = stats(10, 20);
        assert!(stats_exclude(&s, BinOpKind::Eq, &Datum::Int(5)));
        assert!(stats_exclude(&s, BinOpKind::Eq, &Datum::Int(25)));
        assert!(!stats_exclude(&s, BinOpKind::Eq, &Datum::Int(15)));
        assert!(stats_exclude(&s, BinOpKind::Lt, &Datum::Int(10)));
        assert!(!stats_exclude(&s, BinOpKind::Lt, &Datum::Int(11)));
        assert!(stats_exclude(&s, BinOpKind::Gt, &Datum::Int(20)));
        assert!(!stats_exclude(&s, BinOpKind::Ge, &Datum::Int(20)));
        assert!(stats_exclude(&s, BinOpKind::Ge, &Datum::Int(21)));
    }

    #[test]
    fn test_ne_skips_only_constant_fragments() {
        assert!(stats_exclude(&stats(7, 7), BinOpKind::Ne, &Datum::Int(7)));
        assert!(!stats_exclude(&stats(7, 8), BinOpKind::Ne, &Datum::Int(7)));
    }
}
