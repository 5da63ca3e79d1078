/*!
 * Reduction
 *
 * Merges per-kernel output buffers into one. Projection buffers
 * concatenate; hashed group-by buffers merge entry-wise with each
 * target's reduction operator. Reduction is associative by construction
 * so any binary grouping of partials yields the same result.
 */

use crate::core::limits::EMPTY_KEY_64;
use crate::core::types::{fp_to_slot, slot_to_fp, NULL_BIGINT, NULL_DOUBLE};
use crate::ir::agg::AggKind;
use crate::layout::descriptor::{HashKind, QueryMemoryDescriptor, TargetInfo};
use crate::layout::output::OutputBuffer;
use crate::runtime::group::get_group_value;
use thiserror::Error;
use tracing::debug;

/// Reduction failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReduceError {
    #[error("Combined group count exceeds the output buffer capacity")]
    OutOfSlots,

    #[error("More than one value for SINGLE_VALUE aggregate during reduction")]
    SingleValueConflict,
}

/// Fold a list of kernel buffers into one
pub fn reduce_buffers(mut buffers: Vec<OutputBuffer>) -> Result<OutputBuffer, ReduceError> {
    let mut acc = buffers.remove(0);
    for src in buffers {
        reduce_into(&mut acc, &src)?;
    }
    Ok(acc)
}

/// Merge `src` into `dst`
pub fn reduce_into(dst: &mut OutputBuffer, src: &OutputBuffer) -> Result<(), ReduceError> {
    let qmd = std::sync::Arc::clone(dst.qmd());
    debug!(hash_kind = ?qmd.hash_kind, "reducing output buffers");
    match qmd.hash_kind {
        HashKind::Projection => reduce_projection(dst, src, &qmd),
        _ => reduce_grouped(dst, src, &qmd),
    }
}

fn reduce_projection(
    dst: &mut OutputBuffer,
    src: &OutputBuffer,
    qmd: &QueryMemoryDescriptor,
) -> Result<(), ReduceError> {
    let dst_rows = dst.matched_rows();
    let src_rows = src.matched_rows();
    if dst_rows + src_rows > qmd.entry_count {
        return Err(ReduceError::OutOfSlots);
    }
    for src_entry in 0..src_rows {
        let dst_entry = dst_rows + src_entry;
        for slot in 0..qmd.slot_count {
            let v = src.slot(src_entry, slot);
            let idx = qmd.slot_index(dst_entry, slot);
            dst.slots_mut()[idx] = v;
        }
    }
    dst.set_matched_rows(dst_rows + src_rows);
    Ok(())
}

fn reduce_grouped(
    dst: &mut OutputBuffer,
    src: &OutputBuffer,
    qmd: &QueryMemoryDescriptor,
) -> Result<(), ReduceError> {
    let mut key_scratch: Vec<i64> = Vec::with_capacity(qmd.key_count.max(1));
    for src_entry in src.occupied_entries().collect::<Vec<_>>() {
        // aligned layouts share entry indexes; baseline re-probes by key
        let dst_entry = if qmd.hash_kind == HashKind::BaselineHash {
            key_scratch.clear();
            for k in 0..qmd.key_count {
                key_scratch.push(src.key(src_entry, k));
            }
            let entry_count = qmd.entry_count;
            let row_size = qmd.row_size_quad();
            if qmd.output_columnar {
                crate::runtime::group::get_group_value_columnar(
                    dst.slots_mut(),
                    entry_count,
                    &key_scratch,
                )
                .ok_or(ReduceError::OutOfSlots)?
            } else {
                get_group_value(dst.slots_mut(), entry_count, &key_scratch, row_size)
                    .ok_or(ReduceError::OutOfSlots)?
            }
        } else {
            if !qmd.keyless && qmd.key_count > 0 && dst.key(src_entry, 0) == EMPTY_KEY_64 {
                for k in 0..qmd.key_count {
                    let v = src.key(src_entry, k);
                    let idx = qmd.key_index(src_entry, k);
                    dst.slots_mut()[idx] = v;
                }
            }
            src_entry
        };
        merge_entry(dst, src, qmd, dst_entry, src_entry)?;
    }
    Ok(())
}

fn merge_entry(
    dst: &mut OutputBuffer,
    src: &OutputBuffer,
    qmd: &QueryMemoryDescriptor,
    dst_entry: usize,
    src_entry: usize,
) -> Result<(), ReduceError> {
    for (target_idx, slot_desc) in qmd.target_slots.iter().enumerate() {
        let info = &qmd.targets[target_idx];
        let src_val = src.slot(src_entry, slot_desc.slot_idx);
        let dst_idx = qmd.slot_index(dst_entry, slot_desc.slot_idx);

        match info.agg {
            Some(AggKind::CountDistinct) | Some(AggKind::ApproxCountDistinct) => {
                let src_set = src.distinct_set(src_val as usize).clone();
                let dst_arena = dst.slot(dst_entry, slot_desc.slot_idx) as usize;
                let (_, sets) = dst.slots_and_sets();
                sets[dst_arena].merge(&src_set);
            }
            Some(AggKind::Avg) => {
                let arg_fp = info.arg_ty.map_or(false, |t| t.kind.is_fp());
                let buf = dst.slots_mut();
                if arg_fp {
                    buf[dst_idx] = fp_to_slot(slot_to_fp(buf[dst_idx]) + slot_to_fp(src_val));
                } else {
                    buf[dst_idx] = buf[dst_idx].wrapping_add(src_val);
                }
                let count_idx = qmd.slot_index(dst_entry, slot_desc.slot_idx + 1);
                let src_count = src.slot(src_entry, slot_desc.slot_idx + 1);
                buf[count_idx] += src_count;
            }
            _ => {
                let merged = merge_scalar(
                    info,
                    qmd.slot_init_value(target_idx),
                    dst.slot(dst_entry, slot_desc.slot_idx),
                    src_val,
                )?;
                dst.slots_mut()[dst_idx] = merged;
            }
        }
    }
    Ok(())
}

/// Merge one single-slot aggregate pair
fn merge_scalar(
    info: &TargetInfo,
    init_val: i64,
    dst_val: i64,
    src_val: i64,
) -> Result<i64, ReduceError> {
    let arg_fp = info.arg_ty.map_or_else(|| info.ty.kind.is_fp(), |t| t.kind.is_fp());
    Ok(match info.agg {
        None => {
            // group-ref or projected value: identical on both sides,
            // first non-init wins
            if dst_val == init_val {
                src_val
            } else {
                dst_val
            }
        }
        Some(AggKind::Count) => dst_val + src_val,
        Some(AggKind::Sum) => {
            if arg_fp {
                merge_fp_null_aware(dst_val, src_val, |a, b| a + b)
            } else {
                merge_int_null_aware(dst_val, src_val, |a, b| a.wrapping_add(b))
            }
        }
        Some(AggKind::Min) => {
            if arg_fp {
                merge_fp_null_aware(dst_val, src_val, f64::min)
            } else {
                merge_int_null_aware(dst_val, src_val, std::cmp::min)
            }
        }
        Some(AggKind::Max) => {
            if arg_fp {
                merge_fp_null_aware(dst_val, src_val, f64::max)
            } else {
                merge_int_null_aware(dst_val, src_val, std::cmp::max)
            }
        }
        Some(AggKind::Sample) => {
            // first non-null wins, in kernel index order
            let null = crate::core::types::slot_null_value(&info.ty);
            if dst_val == null {
                src_val
            } else {
                dst_val
            }
        }
        Some(AggKind::SingleValue) => {
            let null = crate::core::types::slot_null_value(&info.ty);
            if dst_val == null {
                src_val
            } else if src_val == null || src_val == dst_val {
                dst_val
            } else {
                return Err(ReduceError::SingleValueConflict);
            }
        }
        Some(AggKind::Avg)
        | Some(AggKind::CountDistinct)
        | Some(AggKind::ApproxCountDistinct) => unreachable!("handled by caller"),
    })
}

fn merge_int_null_aware(dst: i64, src: i64, op: impl Fn(i64, i64) -> i64) -> i64 {
    if src == NULL_BIGINT {
        dst
    } else if dst == NULL_BIGINT {
        src
    } else {
        op(dst, src)
    }
}

fn merge_fp_null_aware(dst: i64, src: i64, op: impl Fn(f64, f64) -> f64) -> i64 {
    let d = slot_to_fp(dst);
    let s = slot_to_fp(src);
    if s == NULL_DOUBLE {
        dst
    } else if d == NULL_DOUBLE {
        src
    } else {
        fp_to_slot(op(d, s))
    }
}
