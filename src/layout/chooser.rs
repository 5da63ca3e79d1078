/*!
 * Layout Chooser
 *
 * Deterministic choice of the query memory descriptor from an execution
 * unit, fragment metadata, and config. The same inputs always produce
 * the same descriptor.
 */

use super::descriptor::{HashKind, LayoutError, LayoutResult, QueryMemoryDescriptor};
use super::distinct::CountDistinctDescriptor;
use crate::core::config::EngineConfig;
use crate::core::limits;
use crate::ir::agg::AggKind;
use crate::ir::expr::Expr;
use crate::ir::unit::ExecutionUnit;
use crate::storage::fragment::TableFragments;
use tracing::debug;

/// Resolved group-by key column: id, nullability, and dense range
struct KeyColumn {
    range: Option<(i64, i64)>,
    nullable: bool,
}

fn resolve_key_column(expr: &Expr, fragments: &TableFragments) -> Option<KeyColumn> {
    if let Expr::ColumnRef {
        column,
        nest_level: 0,
        ty,
        ..
    } = expr
    {
        let groupable = ty.kind.is_integer() || ty.kind.is_temporal() || ty.dict_id.is_some();
        if !groupable {
            return None;
        }
        Some(KeyColumn {
            range: fragments.column_int_range(*column),
            nullable: ty.nullable || fragments.column_has_nulls(*column),
        })
    } else {
        None
    }
}

fn choose_count_distinct(
    unit: &ExecutionUnit,
    fragments: &TableFragments,
) -> Vec<Option<CountDistinctDescriptor>> {
    unit.target_exprs
        .iter()
        .map(|t| match t.agg {
            Some(AggKind::CountDistinct) | Some(AggKind::ApproxCountDistinct) => {
                let range = if let Expr::ColumnRef {
                    column,
                    nest_level: 0,
                    ..
                } = &t.expr
                {
                    fragments.column_int_range(*column)
                } else {
                    None
                };
                Some(CountDistinctDescriptor::choose(
                    range,
                    t.agg == Some(AggKind::ApproxCountDistinct),
                ))
            }
            _ => None,
        })
        .collect()
}

fn all_targets_fixed_width(unit: &ExecutionUnit) -> bool {
    unit.target_exprs.iter().all(|t| {
        let ty = t.ty;
        !ty.kind.is_varlen() && (!ty.kind.is_string() || ty.dict_id.is_some())
    })
}

/// Choose the query memory descriptor for an execution unit.
///
/// `device_cap_bytes` is the allocation cap of the device the layout must
/// fit; `cardinality_hint` feeds baseline entry estimation.
pub fn choose_query_memory_descriptor(
    unit: &ExecutionUnit,
    fragments: &TableFragments,
    config: &EngineConfig,
    cardinality_hint: Option<usize>,
    device_cap_bytes: usize,
) -> LayoutResult<QueryMemoryDescriptor> {
    let distinct = choose_count_distinct(unit, fragments);
    let (targets, target_slots, slot_count) =
        QueryMemoryDescriptor::assign_slots(&unit.target_exprs, &distinct);

    let fixed_width = all_targets_fixed_width(unit);
    let columnar = config.enable_columnar_output && fixed_width;

    let mut qmd = QueryMemoryDescriptor {
        hash_kind: HashKind::Projection,
        key_count: 0,
        entry_count: 0,
        min_val: 0,
        max_val: 0,
        bucket: 1,
        keyless: false,
        keyless_count_slot: None,
        multi_key_ranges: Vec::new(),
        output_columnar: columnar,
        use_streaming_top_n: false,
        targets,
        target_slots,
        slot_count,
        count_distinct_descriptors: distinct,
        warp_count: 1,
        blocks_share_memory: false,
    };

    if unit.groupby_exprs.is_empty() {
        if unit.is_agg() {
            qmd.hash_kind = HashKind::None;
            qmd.entry_count = 1;
            qmd.keyless = true;
        } else {
            qmd.hash_kind = HashKind::Projection;
            let total = fragments.total_rows();
            qmd.entry_count = unit.scan_limit.map_or(total, |l| total.min(l));
            // projection rows land at unique indexes; columnar adds nothing
            qmd.output_columnar = false;
        }
        finish(&mut qmd, unit, config);
        qmd.check_feasible(device_cap_bytes)?;
        return Ok(qmd);
    }

    let key_columns: Option<Vec<KeyColumn>> = unit
        .groupby_exprs
        .iter()
        .map(|e| resolve_key_column(e, fragments))
        .collect();
    qmd.key_count = unit.groupby_exprs.len();

    let perfect = key_columns.as_ref().and_then(|cols| {
        if cols.len() == 1 {
            let col = &cols[0];
            let (min_val, max_val) = col.range?;
            let extent = max_val.checked_sub(min_val)?.checked_add(1)? as usize;
            // a nullable key claims one extra bucket past the range
            let entries = extent + col.nullable as usize;
            if entries <= config.big_group_threshold {
                return Some((HashKind::PerfectHashOneCol, entries, min_val, max_val, Vec::new(), col.nullable));
            }
            None
        } else {
            let mut product = 1usize;
            let mut ranges = Vec::with_capacity(cols.len());
            for col in cols {
                let (min_val, max_val) = col.range?;
                if col.nullable {
                    // null keys have no bucket in the mixed-radix space
                    return None;
                }
                let extent = max_val.checked_sub(min_val)?.checked_add(1)? as usize;
                product = product.checked_mul(extent)?;
                if product > config.big_group_threshold {
                    return None;
                }
                ranges.push((min_val, extent as i64));
            }
            Some((HashKind::PerfectHashMulti, product, 0, 0, ranges, false))
        }
    });

    match perfect {
        Some((kind, entries, min_val, max_val, ranges, key_nullable)) => {
            qmd.hash_kind = kind;
            qmd.entry_count = entries;
            qmd.min_val = min_val;
            qmd.max_val = max_val;
            qmd.multi_key_ranges = ranges;

            // keyless: the entry index alone names the group. Requires a
            // non-nullable single key so no bucket is ambiguous, plus a
            // COUNT(*) target to detect occupancy.
            if kind == HashKind::PerfectHashOneCol && !key_nullable {
                if let Some((idx, _)) = qmd
                    .targets
                    .iter()
                    .enumerate()
                    .find(|(_, t)| t.is_count_star)
                {
                    qmd.keyless = true;
                    qmd.keyless_count_slot = Some(qmd.target_slots[idx].slot_idx);
                }
            }
        }
        None => {
            qmd.hash_kind = HashKind::BaselineHash;
            let total = fragments.total_rows();
            let estimated = match cardinality_hint {
                Some(hint) => hint,
                None if total > config.baseline_max_groups => {
                    return Err(LayoutError::CardinalityEstimationRequired {
                        max_groups: config.baseline_max_groups,
                    })
                }
                None => total,
            };
            let entries =
                ((estimated as f64 / limits::BASELINE_FILL_RATE).ceil() as usize).max(16);
            qmd.entry_count = entries;
        }
    }

    finish(&mut qmd, unit, config);
    qmd.check_feasible(device_cap_bytes)?;
    debug!(
        hash_kind = ?qmd.hash_kind,
        entry_count = qmd.entry_count,
        keyless = qmd.keyless,
        columnar = qmd.output_columnar,
        streaming_top_n = qmd.use_streaming_top_n,
        "chose query memory descriptor"
    );
    Ok(qmd)
}

fn finish(qmd: &mut QueryMemoryDescriptor, unit: &ExecutionUnit, config: &EngineConfig) {
    let perfect = matches!(
        qmd.hash_kind,
        HashKind::PerfectHashOneCol | HashKind::PerfectHashMulti
    );
    if let Some(top_n) = unit.sort_info.top_n() {
        qmd.use_streaming_top_n =
            config.enable_streaming_top_n && perfect && top_n <= limits::STREAMING_TOP_N_MAX;
    }
    qmd.blocks_share_memory =
        perfect && qmd.entry_count <= limits::GPU_SHARED_MEM_MAX_ENTRIES;
    qmd.warp_count = if qmd.blocks_share_memory {
        limits::GPU_SHARED_MEM_WARP_COUNT
    } else {
        1
    };
}
