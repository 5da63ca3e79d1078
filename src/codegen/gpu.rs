/*!
 * GPU Shared-Memory Model
 *
 * The device variant of the kernel: aggregate intrinsics are swapped for
 * their atomic `_shared` forms over a shared accumulation buffer, an
 * "init shared mem" prelude seeds it, and the write-back to the output
 * buffer happens after the parallel update phase completes (the model's
 * warp synchronization point).
 */

use super::expr::RowCtx;
use super::kernel::MultifragInput;
use super::row_fn::{CompiledRowFn, GroupKind};
use crate::core::limits::{EMPTY_KEY_64, WATCHDOG_ROW_INTERVAL};
use crate::core::types::{slot_to_fp, NULL_BIGINT, NULL_DOUBLE};
use crate::ir::agg::AggKind;
use crate::layout::output::OutputBuffer;
use crate::runtime::agg as agg_rt;
use crate::runtime::errors::{
    check_interrupt, record_error_code, record_error_code_shared, ERR_INTERRUPTED, ERR_NONE,
};
use crate::runtime::group::perfect_hash_index;
use rayon::prelude::*;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicUsize, Ordering};
use tracing::trace;

/// Rows processed per simulated warp
const WARP_CHUNK: usize = 1024;

/// Whether the shared-memory aggregation path can run this row function
#[must_use]
pub fn supports_shared_memory(row_fn: &CompiledRowFn) -> bool {
    let group_ok = matches!(
        row_fn.group,
        GroupKind::Single | GroupKind::PerfectOneCol { .. }
    );
    row_fn.qmd.blocks_share_memory
        && !row_fn.qmd.output_columnar
        && row_fn.joins.is_empty()
        && group_ok
        && row_fn.qmd.distinct_target_count() == 0
        && row_fn.targets.iter().all(|t| {
            matches!(
                t.agg,
                Some(AggKind::Count)
                    | Some(AggKind::Sum)
                    | Some(AggKind::Min)
                    | Some(AggKind::Max)
                    | Some(AggKind::Avg)
            )
        })
}

/// Shared-memory kernel: parallel per-warp aggregation into an atomic
/// buffer, then write-back into the kernel's output buffer.
pub fn multifrag_query_shared(
    row_fn: &CompiledRowFn,
    input: &MultifragInput<'_>,
    literals: &[i64],
    out: &mut OutputBuffer,
    error: &mut i32,
    total_matched: &AtomicUsize,
) {
    let qmd = &row_fn.qmd;
    // init shared mem prelude
    let shared: Vec<AtomicI64> = qmd.init_states().into_iter().map(AtomicI64::new).collect();
    let shared_error = AtomicI32::new(ERR_NONE);

    for fragment in &input.fragments {
        trace!(
            fragment = fragment.fragment_id,
            rows = fragment.row_count,
            "shared-memory kernel fragment"
        );
        (0..fragment.row_count)
            .into_par_iter()
            .with_min_len(WARP_CHUNK)
            .for_each(|row| {
                if row % WATCHDOG_ROW_INTERVAL == 0 {
                    if row_fn.watchdog && check_interrupt() {
                        record_error_code_shared(ERR_INTERRUPTED, &shared_error);
                    }
                    if shared_error.load(Ordering::Relaxed) != ERR_NONE {
                        return;
                    }
                }
                let mut row_error = ERR_NONE;
                let ctx = RowCtx {
                    outer: &fragment.columns,
                    inner_tables: input.inner_tables,
                    inner_rows: &[],
                    literals,
                    row,
                };

                for qual in &row_fn.quals {
                    if qual(&ctx, &mut row_error) != 1 {
                        if row_error != ERR_NONE {
                            record_error_code_shared(row_error, &shared_error);
                        }
                        return;
                    }
                }

                let entry = match &row_fn.group {
                    GroupKind::Single => 0,
                    GroupKind::PerfectOneCol {
                        key,
                        min_val,
                        bucket,
                        null_bucket,
                        keyless,
                    } => {
                        let key_val = key(&ctx, &mut row_error);
                        let entry = if key_val == NULL_BIGINT {
                            if !*null_bucket {
                                return;
                            }
                            qmd.entry_count - 1
                        } else {
                            perfect_hash_index(key_val, *min_val, *bucket)
                        };
                        if !*keyless {
                            let key_slot = &shared[entry * qmd.row_size_quad()];
                            agg_rt::agg_id_shared(key_slot, key_val, EMPTY_KEY_64);
                        }
                        entry
                    }
                    _ => unreachable!("unsupported group kind on shared path"),
                };

                for target in &row_fn.targets {
                    let value = (target.eval)(&ctx, &mut row_error);
                    let idx = qmd.slot_index(entry, target.slot.slot_idx);
                    let slot = &shared[idx];
                    match target.agg {
                        Some(AggKind::Count) => {
                            if target.is_count_star {
                                agg_rt::agg_count_shared(slot);
                            } else {
                                agg_rt::agg_count_skip_val_shared(
                                    slot,
                                    value,
                                    target.arg_null_slot,
                                );
                            }
                        }
                        Some(AggKind::Sum) => {
                            if target.arg_is_fp {
                                agg_rt::agg_sum_double_skip_val_shared(
                                    slot,
                                    slot_to_fp(value),
                                    NULL_DOUBLE,
                                );
                            } else if target.arg_nullable {
                                agg_rt::agg_sum_skip_val_shared(slot, value, NULL_BIGINT);
                            } else {
                                agg_rt::agg_sum_shared(slot, value);
                            }
                        }
                        Some(AggKind::Min) => {
                            if target.arg_is_fp {
                                agg_rt::agg_min_double_skip_val_shared(
                                    slot,
                                    slot_to_fp(value),
                                    NULL_DOUBLE,
                                );
                            } else {
                                agg_rt::agg_min_skip_val_shared(slot, value, NULL_BIGINT);
                            }
                        }
                        Some(AggKind::Max) => {
                            if target.arg_is_fp {
                                agg_rt::agg_max_double_skip_val_shared(
                                    slot,
                                    slot_to_fp(value),
                                    NULL_DOUBLE,
                                );
                            } else {
                                agg_rt::agg_max_skip_val_shared(slot, value, NULL_BIGINT);
                            }
                        }
                        Some(AggKind::Avg) => {
                            let count_slot = &shared[qmd.slot_index(entry, target.slot.slot_idx + 1)];
                            if target.arg_is_fp {
                                agg_rt::agg_sum_double_skip_val_shared(
                                    slot,
                                    slot_to_fp(value),
                                    NULL_DOUBLE,
                                );
                            } else if value != NULL_BIGINT {
                                agg_rt::agg_sum_shared(slot, value);
                            }
                            agg_rt::agg_count_skip_val_shared(
                                count_slot,
                                value,
                                target.arg_null_slot,
                            );
                        }
                        _ => unreachable!("unsupported aggregate on shared path"),
                    }
                }

                if row_error != ERR_NONE {
                    record_error_code_shared(row_error, &shared_error);
                }
                total_matched.fetch_add(1, Ordering::Relaxed);
            });
    }

    // parallel phase complete: write back into the output buffer
    let data: Vec<i64> = shared.into_iter().map(AtomicI64::into_inner).collect();
    out.overwrite(data);
    let code = shared_error.load(Ordering::Relaxed);
    if code != ERR_NONE {
        record_error_code(code, error);
    }
}
