/*!
 * Aggregate Update Intrinsics
 *
 * Unary updates against an 8-byte aggregator slot. CPU kernels own their
 * output buffer exclusively, so the plain variants take `&mut i64`; the
 * `_shared` variants are the GPU shared-memory model and use atomics.
 * Floating-point aggregators alias the slot through bit reinterpretation.
 */

use super::errors::{ERR_NONE, ERR_SINGLE_VALUE_MULTIPLE_VALUES};
use crate::core::types::{fp_to_slot, slot_to_fp};
use std::sync::atomic::{AtomicI64, Ordering};

// ---------------------------------------------------------------------------
// Count
// ---------------------------------------------------------------------------

#[inline(always)]
pub fn agg_count(slot: &mut i64) {
    *slot += 1;
}

/// Count rows whose value is not the aggregate's null sentinel
#[inline(always)]
pub fn agg_count_skip_val(slot: &mut i64, val: i64, skip_val: i64) {
    if val != skip_val {
        *slot += 1;
    }
}

#[inline(always)]
pub fn agg_count_double_skip_val(slot: &mut i64, val: f64, skip_val: f64) {
    if val != skip_val {
        *slot += 1;
    }
}

// ---------------------------------------------------------------------------
// Sum
// ---------------------------------------------------------------------------

#[inline(always)]
pub fn agg_sum(slot: &mut i64, val: i64) {
    *slot = slot.wrapping_add(val);
}

/// Sum skipping the null sentinel. A slot still holding the sentinel is
/// replaced by the first real value, so an all-null group stays null.
#[inline(always)]
pub fn agg_sum_skip_val(slot: &mut i64, val: i64, skip_val: i64) {
    if val != skip_val {
        if *slot == skip_val {
            *slot = val;
        } else {
            *slot = slot.wrapping_add(val);
        }
    }
}

#[inline(always)]
pub fn agg_sum_double(slot: &mut i64, val: f64) {
    *slot = fp_to_slot(slot_to_fp(*slot) + val);
}

#[inline(always)]
pub fn agg_sum_double_skip_val(slot: &mut i64, val: f64, skip_val: f64) {
    if val != skip_val {
        let cur = slot_to_fp(*slot);
        *slot = fp_to_slot(if cur == skip_val { val } else { cur + val });
    }
}

/// 4-byte float form, aliasing the low half of the slot
#[inline(always)]
pub fn agg_sum_float(slot: &mut i32, val: f32) {
    *slot = (f32::from_bits(*slot as u32) + val).to_bits() as i32;
}

#[inline(always)]
pub fn agg_sum_float_skip_val(slot: &mut i32, val: f32, skip_val: f32) {
    if val != skip_val {
        let cur = f32::from_bits(*slot as u32);
        let next = if cur == skip_val { val } else { cur + val };
        *slot = next.to_bits() as i32;
    }
}

// ---------------------------------------------------------------------------
// Min / Max
// ---------------------------------------------------------------------------

#[inline(always)]
pub fn agg_min(slot: &mut i64, val: i64) {
    *slot = (*slot).min(val);
}

#[inline(always)]
pub fn agg_min_skip_val(slot: &mut i64, val: i64, skip_val: i64) {
    if val != skip_val {
        if *slot == skip_val {
            *slot = val;
        } else {
            *slot = (*slot).min(val);
        }
    }
}

#[inline(always)]
pub fn agg_max(slot: &mut i64, val: i64) {
    *slot = (*slot).max(val);
}

#[inline(always)]
pub fn agg_max_skip_val(slot: &mut i64, val: i64, skip_val: i64) {
    if val != skip_val {
        if *slot == skip_val {
            *slot = val;
        } else {
            *slot = (*slot).max(val);
        }
    }
}

#[inline(always)]
pub fn agg_min_double_skip_val(slot: &mut i64, val: f64, skip_val: f64) {
    if val != skip_val {
        let cur = slot_to_fp(*slot);
        *slot = fp_to_slot(if cur == skip_val { val } else { cur.min(val) });
    }
}

#[inline(always)]
pub fn agg_max_double_skip_val(slot: &mut i64, val: f64, skip_val: f64) {
    if val != skip_val {
        let cur = slot_to_fp(*slot);
        *slot = fp_to_slot(if cur == skip_val { val } else { cur.max(val) });
    }
}

// ---------------------------------------------------------------------------
// Id / single value
// ---------------------------------------------------------------------------

/// Unconditional write; the write-once discipline for SAMPLE is a branch
/// in the generated row function.
#[inline(always)]
pub fn agg_id(slot: &mut i64, val: i64) {
    *slot = val;
}

/// SINGLE_VALUE write: first value wins, a second distinct value is a
/// runtime error.
#[inline(always)]
#[must_use]
pub fn agg_single_value(slot: &mut i64, val: i64, empty_val: i64) -> i32 {
    if *slot == empty_val {
        *slot = val;
        ERR_NONE
    } else if *slot == val {
        ERR_NONE
    } else {
        ERR_SINGLE_VALUE_MULTIPLE_VALUES
    }
}

// ---------------------------------------------------------------------------
// Shared-memory (GPU model) variants
// ---------------------------------------------------------------------------

#[inline]
fn atomic_rmw(slot: &AtomicI64, f: impl Fn(i64) -> i64) {
    let mut cur = slot.load(Ordering::Relaxed);
    loop {
        let next = f(cur);
        match slot.compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return,
            Err(observed) => cur = observed,
        }
    }
}

#[inline(always)]
pub fn agg_count_shared(slot: &AtomicI64) {
    slot.fetch_add(1, Ordering::Relaxed);
}

#[inline(always)]
pub fn agg_count_skip_val_shared(slot: &AtomicI64, val: i64, skip_val: i64) {
    if val != skip_val {
        slot.fetch_add(1, Ordering::Relaxed);
    }
}

#[inline(always)]
pub fn agg_sum_shared(slot: &AtomicI64, val: i64) {
    slot.fetch_add(val, Ordering::Relaxed);
}

#[inline(always)]
pub fn agg_sum_skip_val_shared(slot: &AtomicI64, val: i64, skip_val: i64) {
    if val != skip_val {
        atomic_rmw(slot, |cur| {
            if cur == skip_val {
                val
            } else {
                cur.wrapping_add(val)
            }
        });
    }
}

#[inline(always)]
pub fn agg_min_shared(slot: &AtomicI64, val: i64) {
    slot.fetch_min(val, Ordering::Relaxed);
}

#[inline(always)]
pub fn agg_min_skip_val_shared(slot: &AtomicI64, val: i64, skip_val: i64) {
    if val != skip_val {
        atomic_rmw(slot, |cur| if cur == skip_val { val } else { cur.min(val) });
    }
}

#[inline(always)]
pub fn agg_max_shared(slot: &AtomicI64, val: i64) {
    slot.fetch_max(val, Ordering::Relaxed);
}

#[inline(always)]
pub fn agg_max_skip_val_shared(slot: &AtomicI64, val: i64, skip_val: i64) {
    if val != skip_val {
        atomic_rmw(slot, |cur| if cur == skip_val { val } else { cur.max(val) });
    }
}

#[inline(always)]
pub fn agg_sum_double_shared(slot: &AtomicI64, val: f64) {
    atomic_rmw(slot, |cur| fp_to_slot(slot_to_fp(cur) + val));
}

#[inline(always)]
pub fn agg_sum_double_skip_val_shared(slot: &AtomicI64, val: f64, skip_val: f64) {
    if val != skip_val {
        atomic_rmw(slot, |cur| {
            let c = slot_to_fp(cur);
            fp_to_slot(if c == skip_val { val } else { c + val })
        });
    }
}

#[inline(always)]
pub fn agg_min_double_skip_val_shared(slot: &AtomicI64, val: f64, skip_val: f64) {
    if val != skip_val {
        atomic_rmw(slot, |cur| {
            let c = slot_to_fp(cur);
            fp_to_slot(if c == skip_val { val } else { c.min(val) })
        });
    }
}

#[inline(always)]
pub fn agg_max_double_skip_val_shared(slot: &AtomicI64, val: f64, skip_val: f64) {
    if val != skip_val {
        atomic_rmw(slot, |cur| {
            let c = slot_to_fp(cur);
            fp_to_slot(if c == skip_val { val } else { c.max(val) })
        });
    }
}

/// Write-once shared id: only the first writer lands
#[inline(always)]
pub fn agg_id_shared(slot: &AtomicI64, val: i64, empty_val: i64) {
    let _ = slot.compare_exchange(empty_val, val, Ordering::Relaxed, Ordering::Relaxed);
}
