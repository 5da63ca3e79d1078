/*!
 * Row Function
 *
 * The compiled per-row body: join probes, qual evaluation, group-value
 * lookup, and aggregate updates, composed from the intrinsic library.
 * Per-row errors are recorded as codes; the row function never
 * allocates (scratch buffers are owned by the kernel).
 */

use super::expr::{
    CodegenError, CodegenResult, ColumnSlice, CompiledExpr, ExprCompiler, InnerTableView, RowCtx,
};
use super::extensions::ExtensionFnRegistry;
use super::literals::LiteralBuffer;
use crate::core::config::EngineConfig;
use crate::core::types::{slot_null_value, slot_to_fp, NULL_BIGINT, NULL_DOUBLE};
use crate::ir::agg::AggKind;
use crate::ir::unit::{ExecutionUnit, JoinType};
use crate::join::table::{JoinHashTable, ProbeResult};
use crate::layout::descriptor::{HashKind, QueryMemoryDescriptor, TargetSlot};
use crate::layout::output::OutputBuffer;
use crate::runtime::agg as agg_rt;
use crate::runtime::errors::{record_error_code, ERR_NONE, ERR_OUT_OF_SLOTS};
use crate::runtime::group::{
    get_group_value, get_group_value_columnar, get_group_value_with_watchdog,
    get_matching_group_value_perfect_hash, perfect_hash_index, GroupLookup,
};
use crate::runtime::join::JOIN_MISS;
use crate::storage::provider::SchemaProvider;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One compiled join level
pub struct CompiledJoin {
    pub outer_key: CompiledExpr,
    pub join_type: JoinType,
    /// Internal null sentinel of the outer key expression
    pub key_null: i64,
}

/// How the row function obtains its output entry index
pub enum GroupKind {
    /// Non-grouped aggregate: everything lands in entry 0
    Single,
    /// One entry per matched row, in kernel write order
    Projection,
    PerfectOneCol {
        key: CompiledExpr,
        min_val: i64,
        bucket: i64,
        /// Null keys own the trailing bucket
        null_bucket: bool,
        keyless: bool,
    },
    PerfectMulti {
        keys: Vec<CompiledExpr>,
        /// (min, extent) per key, mixed-radix addressed
        ranges: Vec<(i64, i64)>,
    },
    Baseline {
        keys: Vec<CompiledExpr>,
    },
}

/// One compiled output target
pub struct CompiledTarget {
    pub eval: CompiledExpr,
    pub agg: Option<AggKind>,
    pub slot: TargetSlot,
    /// Aggregate operand evaluates in the f64 domain
    pub arg_is_fp: bool,
    /// Operand may be null, selecting the skip-val update variants
    pub arg_nullable: bool,
    /// Internal null of the operand's slot domain
    pub arg_null_slot: i64,
    /// Internal null of the result slot
    pub slot_null: i64,
    pub is_count_star: bool,
}

/// Immutable per-kernel inputs shared by every row
pub struct KernelInput<'a> {
    pub outer: &'a [ColumnSlice<'a>],
    pub inner_tables: &'a [InnerTableView],
    pub literals: &'a [i64],
    pub join_tables: &'a [Arc<JoinHashTable>],
    /// Stop once this many rows matched (sample queries)
    pub max_matched: Option<usize>,
}

/// The compiled row function
pub struct CompiledRowFn {
    pub quals: Vec<CompiledExpr>,
    pub joins: Vec<CompiledJoin>,
    pub group: GroupKind,
    pub targets: Vec<CompiledTarget>,
    pub qmd: Arc<QueryMemoryDescriptor>,
    pub watchdog: bool,
}

impl CompiledRowFn {
    /// Process one outer row. Returns false when the kernel must stop
    /// (scan limit reached, out of slots, or a global error).
    pub fn run_row(
        &self,
        input: &KernelInput<'_>,
        row: usize,
        inner_rows: &mut Vec<i64>,
        key_scratch: &mut Vec<i64>,
        out: &mut OutputBuffer,
        error: &mut i32,
        total_matched: &AtomicUsize,
    ) -> bool {
        debug_assert!(inner_rows.is_empty());
        self.join_level(input, 0, row, inner_rows, key_scratch, out, error, total_matched)
    }

    #[allow(clippy::too_many_arguments)]
    fn join_level(
        &self,
        input: &KernelInput<'_>,
        level: usize,
        row: usize,
        inner_rows: &mut Vec<i64>,
        key_scratch: &mut Vec<i64>,
        out: &mut OutputBuffer,
        error: &mut i32,
        total_matched: &AtomicUsize,
    ) -> bool {
        if level == self.joins.len() {
            return self.row_body(input, row, inner_rows, key_scratch, out, error, total_matched);
        }
        let join = &self.joins[level];
        let table = &input.join_tables[level];

        let key = {
            let ctx = RowCtx {
                outer: input.outer,
                inner_tables: input.inner_tables,
                inner_rows,
                literals: input.literals,
                row,
            };
            (join.outer_key)(&ctx, error)
        };
        let translated = table.translate_key(key, join.key_null);

        match table.probe(translated) {
            ProbeResult::Miss => match join.join_type {
                JoinType::Inner => true,
                JoinType::Left => {
                    inner_rows.push(JOIN_MISS);
                    let keep_going = self.join_level(
                        input,
                        level + 1,
                        row,
                        inner_rows,
                        key_scratch,
                        out,
                        error,
                        total_matched,
                    );
                    inner_rows.pop();
                    keep_going
                }
            },
            ProbeResult::Row(inner_row) => {
                inner_rows.push(inner_row);
                let keep_going = self.join_level(
                    input,
                    level + 1,
                    row,
                    inner_rows,
                    key_scratch,
                    out,
                    error,
                    total_matched,
                );
                inner_rows.pop();
                keep_going
            }
            ProbeResult::Range { offset, count } => {
                for i in 0..count {
                    inner_rows.push(table.payload_row(offset + i));
                    let keep_going = self.join_level(
                        input,
                        level + 1,
                        row,
                        inner_rows,
                        key_scratch,
                        out,
                        error,
                        total_matched,
                    );
                    inner_rows.pop();
                    if !keep_going {
                        return false;
                    }
                }
                true
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn row_body(
        &self,
        input: &KernelInput<'_>,
        row: usize,
        inner_rows: &[i64],
        key_scratch: &mut Vec<i64>,
        out: &mut OutputBuffer,
        error: &mut i32,
        total_matched: &AtomicUsize,
    ) -> bool {
        let ctx = RowCtx {
            outer: input.outer,
            inner_tables: input.inner_tables,
            inner_rows,
            literals: input.literals,
            row,
        };

        for qual in &self.quals {
            if qual(&ctx, error) != 1 {
                return true;
            }
        }

        let qmd = Arc::clone(out.qmd());
        let entry = match &self.group {
            GroupKind::Single => 0,
            GroupKind::Projection => {
                let idx = out.matched_rows();
                if idx >= qmd.entry_count {
                    return false;
                }
                out.set_matched_rows(idx + 1);
                idx
            }
            GroupKind::PerfectOneCol {
                key,
                min_val,
                bucket,
                null_bucket,
                keyless,
            } => {
                let key_val = key(&ctx, error);
                let entry = if key_val == NULL_BIGINT {
                    if !*null_bucket {
                        // a null key with no bucket cannot group
                        return true;
                    }
                    qmd.entry_count - 1
                } else {
                    perfect_hash_index(key_val, *min_val, *bucket)
                };
                if !*keyless {
                    key_scratch.clear();
                    key_scratch.push(key_val);
                    if qmd.output_columnar {
                        // bucket ownership makes the columnar write direct
                        let idx = qmd.key_index(entry, 0);
                        out.slots_mut()[idx] = key_val;
                    } else {
                        let row_size = qmd.row_size_quad();
                        get_matching_group_value_perfect_hash(
                            out.slots_mut(),
                            entry,
                            key_scratch,
                            row_size,
                        );
                    }
                }
                entry
            }
            GroupKind::PerfectMulti { keys, ranges } => {
                key_scratch.clear();
                let mut entry = 0usize;
                for (key, (min_val, extent)) in keys.iter().zip(ranges) {
                    let key_val = key(&ctx, error);
                    key_scratch.push(key_val);
                    entry = entry * (*extent as usize) + (key_val - min_val) as usize;
                }
                if qmd.output_columnar {
                    for (k, key_val) in key_scratch.iter().enumerate() {
                        let idx = qmd.key_index(entry, k);
                        out.slots_mut()[idx] = *key_val;
                    }
                } else {
                    let row_size = qmd.row_size_quad();
                    get_matching_group_value_perfect_hash(
                        out.slots_mut(),
                        entry,
                        key_scratch,
                        row_size,
                    );
                }
                entry
            }
            GroupKind::Baseline { keys } => {
                key_scratch.clear();
                for key in keys {
                    key_scratch.push(key(&ctx, error));
                }
                let entry_count = qmd.entry_count;
                let row_size = qmd.row_size_quad();
                let lookup = if qmd.output_columnar {
                    match get_group_value_columnar(out.slots_mut(), entry_count, key_scratch) {
                        Some(e) => GroupLookup::Found(e),
                        None => GroupLookup::Full,
                    }
                } else if self.watchdog {
                    get_group_value_with_watchdog(out.slots_mut(), entry_count, key_scratch, row_size)
                } else {
                    match get_group_value(out.slots_mut(), entry_count, key_scratch, row_size) {
                        Some(e) => GroupLookup::Found(e),
                        None => GroupLookup::Full,
                    }
                };
                match lookup {
                    GroupLookup::Found(entry) => entry,
                    GroupLookup::Full => {
                        record_error_code(ERR_OUT_OF_SLOTS, error);
                        return false;
                    }
                    GroupLookup::Interrupted => {
                        record_error_code(crate::runtime::errors::ERR_INTERRUPTED, error);
                        return false;
                    }
                }
            }
        };

        for target in &self.targets {
            let value = (target.eval)(&ctx, error);
            if !self.update_target(target, &qmd, entry, value, out, error) {
                return false;
            }
        }

        let matched = total_matched.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(max) = input.max_matched {
            if matched >= max {
                return false;
            }
        }
        true
    }

    fn update_target(
        &self,
        target: &CompiledTarget,
        qmd: &QueryMemoryDescriptor,
        entry: usize,
        value: i64,
        out: &mut OutputBuffer,
        error: &mut i32,
    ) -> bool {
        let idx = qmd.slot_index(entry, target.slot.slot_idx);
        let (buf, sets) = out.slots_and_sets();
        match target.agg {
            None => agg_rt::agg_id(&mut buf[idx], value),
            Some(AggKind::Count) => {
                if target.is_count_star {
                    agg_rt::agg_count(&mut buf[idx]);
                } else {
                    agg_rt::agg_count_skip_val(&mut buf[idx], value, target.arg_null_slot);
                }
            }
            Some(AggKind::Sum) => {
                if target.arg_is_fp {
                    agg_rt::agg_sum_double_skip_val(&mut buf[idx], slot_to_fp(value), NULL_DOUBLE);
                } else if target.arg_nullable {
                    agg_rt::agg_sum_skip_val(&mut buf[idx], value, NULL_BIGINT);
                } else {
                    agg_rt::agg_sum(&mut buf[idx], value);
                }
            }
            Some(AggKind::Min) => {
                if target.arg_is_fp {
                    agg_rt::agg_min_double_skip_val(&mut buf[idx], slot_to_fp(value), NULL_DOUBLE);
                } else {
                    agg_rt::agg_min_skip_val(&mut buf[idx], value, NULL_BIGINT);
                }
            }
            Some(AggKind::Max) => {
                if target.arg_is_fp {
                    agg_rt::agg_max_double_skip_val(&mut buf[idx], slot_to_fp(value), NULL_DOUBLE);
                } else {
                    agg_rt::agg_max_skip_val(&mut buf[idx], value, NULL_BIGINT);
                }
            }
            Some(AggKind::Avg) => {
                let count_idx = qmd.slot_index(entry, target.slot.slot_idx + 1);
                if target.arg_is_fp {
                    agg_rt::agg_sum_double_skip_val(&mut buf[idx], slot_to_fp(value), NULL_DOUBLE);
                } else if value != NULL_BIGINT {
                    agg_rt::agg_sum(&mut buf[idx], value);
                }
                agg_rt::agg_count_skip_val(&mut buf[count_idx], value, target.arg_null_slot);
            }
            Some(AggKind::Sample) => {
                if buf[idx] == target.slot_null && value != target.arg_null_slot {
                    agg_rt::agg_id(&mut buf[idx], value);
                }
            }
            Some(AggKind::SingleValue) => {
                if value != target.arg_null_slot {
                    let code = agg_rt::agg_single_value(&mut buf[idx], value, target.slot_null);
                    if code != ERR_NONE {
                        record_error_code(code, error);
                        return false;
                    }
                }
            }
            Some(AggKind::CountDistinct) | Some(AggKind::ApproxCountDistinct) => {
                if value != target.arg_null_slot {
                    let arena_idx = buf[idx] as usize;
                    sets[arena_idx].add(value);
                }
            }
        }
        true
    }
}

/// Lower an execution unit into its compiled row function. The literal
/// buffer is populated as a side effect and finalized by the caller.
pub fn compile_row_fn(
    unit: &ExecutionUnit,
    qmd: Arc<QueryMemoryDescriptor>,
    schema: &dyn SchemaProvider,
    extensions: &ExtensionFnRegistry,
    config: &EngineConfig,
    literals: &mut LiteralBuffer,
) -> CodegenResult<CompiledRowFn> {
    let mut compiler = ExprCompiler {
        literals,
        schema,
        extensions,
        hoist_literals: config.hoist_literals,
    };

    let mut quals = Vec::with_capacity(unit.simple_quals.len() + unit.quals.len());
    for q in unit.simple_quals.iter().chain(&unit.quals) {
        quals.push(compiler.compile(q)?);
    }

    let mut joins = Vec::with_capacity(unit.join_conditions.len());
    for condition in &unit.join_conditions {
        let key_ty = condition.outer_expr.type_desc();
        joins.push(CompiledJoin {
            outer_key: compiler.compile(&condition.outer_expr)?,
            join_type: condition.join_type,
            key_null: slot_null_value(&key_ty),
        });
    }

    let group = match qmd.hash_kind {
        HashKind::None => GroupKind::Single,
        HashKind::Projection => GroupKind::Projection,
        HashKind::PerfectHashOneCol => {
            let key_expr = unit.groupby_exprs.first().ok_or_else(|| {
                CodegenError::UnsupportedPlan("perfect hash without group-by".into())
            })?;
            let extent = (qmd.max_val - qmd.min_val + 1) as usize;
            GroupKind::PerfectOneCol {
                key: compiler.compile(key_expr)?,
                min_val: qmd.min_val,
                bucket: qmd.bucket,
                null_bucket: qmd.entry_count > extent,
                keyless: qmd.keyless,
            }
        }
        HashKind::PerfectHashMulti => {
            let keys: CodegenResult<Vec<CompiledExpr>> = unit
                .groupby_exprs
                .iter()
                .map(|e| compiler.compile(e))
                .collect();
            GroupKind::PerfectMulti {
                keys: keys?,
                ranges: qmd.multi_key_ranges.clone(),
            }
        }
        HashKind::BaselineHash => {
            let keys: CodegenResult<Vec<CompiledExpr>> = unit
                .groupby_exprs
                .iter()
                .map(|e| compiler.compile(e))
                .collect();
            GroupKind::Baseline { keys: keys? }
        }
    };

    let mut targets = Vec::with_capacity(unit.target_exprs.len());
    for (i, t) in unit.target_exprs.iter().enumerate() {
        let arg_ty = t.expr.type_desc();
        targets.push(CompiledTarget {
            eval: compiler.compile(&t.expr)?,
            agg: t.agg,
            slot: qmd.target_slots[i],
            arg_is_fp: arg_ty.kind.is_fp(),
            arg_nullable: arg_ty.nullable,
            arg_null_slot: slot_null_value(&arg_ty),
            slot_null: slot_null_value(&t.ty),
            is_count_star: t.is_count_star(),
        });
    }

    Ok(CompiledRowFn {
        quals,
        joins,
        group,
        targets,
        qmd,
        watchdog: config.watchdog_enable,
    })
}
